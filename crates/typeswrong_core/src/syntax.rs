use log::{debug, trace};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_span::SourceType;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::types::FileExtension;

/// Module syntax a file is authored in, independent of how it is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxKind {
    /// `import`/`export` declarations are present.
    Esm,
    /// `require`, `module.exports` or `exports.*` are used.
    Cjs,
    /// Neither; the file is a plain script.
    None,
    /// The parser gave up on the file.
    Unparsable,
}

/// Export names a CommonJS module makes statically detectable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CjsExports {
    pub names: BTreeSet<String>,
    /// `module.exports = ...` appears somewhere.
    pub assigns_module_exports: bool,
    /// `module.exports` is assigned something other than an object literal,
    /// so the export names cannot be known.
    pub opaque: bool,
    /// `exports.__esModule` is set.
    pub es_module_marker: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxInfo {
    pub kind: SyntaxKind,
    /// Value names exported with ESM syntax, `"default"` included.
    pub esm_exports: BTreeSet<String>,
    /// `export * from` hides part of the export list.
    pub has_star_reexport: bool,
    /// `export = value` in a declaration file.
    pub has_export_equals: bool,
    pub cjs: CjsExports,
}

impl SyntaxInfo {
    fn unparsable() -> Self {
        Self {
            kind: SyntaxKind::Unparsable,
            esm_exports: BTreeSet::new(),
            has_star_reexport: false,
            has_export_equals: false,
            cjs: CjsExports::default(),
        }
    }
}

/// Scans `source` for module syntax and export names.
///
/// The declared format plays no part here; a `.cjs` file full of `export`
/// statements still reports [`SyntaxKind::Esm`].
pub fn analyze_syntax(path: &str, source: &str) -> SyntaxInfo {
    trace!("Scanning module syntax: {}", path);
    let st = source_type_for(path);
    let allocator = Allocator::default();
    let ParserReturn { program, panicked, .. } = OxcParser::new(&allocator, source, st).parse();
    if panicked {
        debug!("Parser gave up on {}", path);
        return SyntaxInfo::unparsable();
    }

    let mut esm_exports = BTreeSet::new();
    let mut has_module_syntax = false;
    let mut has_star_reexport = false;
    let mut has_export_equals = false;
    let mut cjs = CjsScan::default();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(_) => has_module_syntax = true,
            Statement::ExportAllDeclaration(decl) => {
                has_module_syntax = true;
                if decl.export_kind.is_type() {
                    continue;
                }
                match &decl.exported {
                    Some(name) => {
                        esm_exports.insert(name.name().to_string());
                    }
                    None => has_star_reexport = true,
                }
            }
            Statement::ExportDefaultDeclaration(_) => {
                has_module_syntax = true;
                esm_exports.insert("default".to_string());
            }
            Statement::ExportNamedDeclaration(decl) => {
                has_module_syntax = true;
                // `export declare ...` is flagged as type-only but still binds values
                if let Some(declaration) = &decl.declaration {
                    collect_declaration_names(declaration, &mut esm_exports);
                }
                if decl.export_kind.is_type() {
                    trace!("Skipping type-only export list in {}", path);
                    continue;
                }
                for spec in &decl.specifiers {
                    if !spec.export_kind.is_type() {
                        esm_exports.insert(spec.exported.name().to_string());
                    }
                }
            }
            Statement::TSExportAssignment(_) => {
                has_module_syntax = true;
                has_export_equals = true;
            }
            Statement::TSNamespaceExportDeclaration(_) => has_module_syntax = true,
            Statement::ExpressionStatement(es) => cjs.scan_expression(&es.expression),
            Statement::VariableDeclaration(vd) => {
                // const x = require('...')
                for decl in &vd.declarations {
                    if let Some(init) = &decl.init {
                        cjs.scan_expression(init);
                    }
                }
            }
            _ => {}
        }
    }

    let kind = if has_module_syntax {
        SyntaxKind::Esm
    } else if cjs.has_require || cjs.has_exports_access {
        SyntaxKind::Cjs
    } else {
        SyntaxKind::None
    };

    debug!("{} is authored as {:?} ({} ESM exports)", path, kind, esm_exports.len());
    SyntaxInfo { kind, esm_exports, has_star_reexport, has_export_equals, cjs: cjs.exports }
}

fn collect_declaration_names(declaration: &Declaration, names: &mut BTreeSet<String>) {
    match declaration {
        Declaration::VariableDeclaration(variable) => {
            for declarator in &variable.declarations {
                if let BindingPatternKind::BindingIdentifier(ident) = &declarator.id.kind {
                    names.insert(ident.name.to_string());
                }
            }
        }
        Declaration::FunctionDeclaration(function) => {
            if let Some(id) = &function.id {
                names.insert(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.insert(id.name.to_string());
            }
        }
        Declaration::TSEnumDeclaration(enumeration) => {
            names.insert(enumeration.id.name.to_string());
        }
        Declaration::TSModuleDeclaration(module) => {
            names.insert(module.id.name().to_string());
        }
        Declaration::TSTypeAliasDeclaration(_) | Declaration::TSInterfaceDeclaration(_) => {}
        _ => {}
    }
}

#[derive(Debug, Default)]
struct CjsScan {
    has_require: bool,
    has_exports_access: bool,
    exports: CjsExports,
}

impl CjsScan {
    fn scan_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::AssignmentExpression(ae) => {
                self.scan_assignment_target(&ae.left, &ae.right);
                // module.exports = exports = fn
                self.scan_expression(&ae.right);
            }
            Expression::CallExpression(ce) => {
                if let Expression::Identifier(callee_ident) = &ce.callee
                    && callee_ident.name.as_str() == "require"
                    && !ce.arguments.is_empty()
                    && let Some(Expression::StringLiteral(sl)) = ce.arguments[0].as_expression()
                {
                    trace!("Found require() call: '{}'", sl.value);
                    self.has_require = true;
                }
                self.scan_define_property(ce);
                // Recursively check arguments for nested require() calls
                for arg in &ce.arguments {
                    if let Some(arg_expr) = arg.as_expression() {
                        self.scan_expression(arg_expr);
                    }
                }
                self.scan_expression(&ce.callee);
            }
            Expression::SequenceExpression(se) => {
                // exports.a = 1, exports.b = 2
                for e in &se.expressions {
                    self.scan_expression(e);
                }
            }
            Expression::ArrayExpression(ae) => {
                for elem in &ae.elements {
                    if let Some(expr) = elem.as_expression() {
                        self.scan_expression(expr);
                    }
                }
            }
            Expression::ObjectExpression(oe) => {
                for prop in &oe.properties {
                    if let ObjectPropertyKind::ObjectProperty(p) = prop {
                        self.scan_expression(&p.value);
                    }
                }
            }
            Expression::ConditionalExpression(ce) => {
                self.scan_expression(&ce.test);
                self.scan_expression(&ce.consequent);
                self.scan_expression(&ce.alternate);
            }
            Expression::ParenthesizedExpression(pe) => self.scan_expression(&pe.expression),
            Expression::StaticMemberExpression(me) => {
                if is_module_exports(expr) || is_identifier(&me.object, "exports") {
                    self.has_exports_access = true;
                }
            }
            _ => {}
        }
    }

    fn scan_assignment_target(&mut self, target: &AssignmentTarget, value: &Expression) {
        let (object, property) = match target {
            AssignmentTarget::StaticMemberExpression(me) => {
                (&me.object, Some(me.property.name.to_string()))
            }
            AssignmentTarget::ComputedMemberExpression(me) => match &me.expression {
                Expression::StringLiteral(sl) => (&me.object, Some(sl.value.to_string())),
                _ => (&me.object, None),
            },
            _ => return,
        };

        // module.exports = ...
        if is_identifier(object, "module") && property.as_deref() == Some("exports") {
            self.has_exports_access = true;
            self.exports.assigns_module_exports = true;
            self.scan_module_exports_value(value);
            return;
        }

        // exports.x = ... / module.exports.x = ...
        if is_identifier(object, "exports") || is_module_exports(object) {
            self.has_exports_access = true;
            match property {
                Some(name) if name == "__esModule" => self.exports.es_module_marker = true,
                Some(name) => {
                    self.exports.names.insert(name);
                }
                None => {}
            }
        }
    }

    fn scan_module_exports_value(&mut self, value: &Expression) {
        let Expression::ObjectExpression(oe) = value else {
            self.exports.opaque = true;
            return;
        };
        for prop in &oe.properties {
            match prop {
                ObjectPropertyKind::ObjectProperty(p) => match p.key.static_name() {
                    Some(name) => {
                        self.exports.names.insert(name.to_string());
                    }
                    None => self.exports.opaque = true,
                },
                ObjectPropertyKind::SpreadProperty(_) => self.exports.opaque = true,
            }
        }
    }

    /// Object.defineProperty(exports, "name", { ... })
    fn scan_define_property(&mut self, ce: &CallExpression) {
        let Expression::StaticMemberExpression(callee) = &ce.callee else { return };
        if !is_identifier(&callee.object, "Object") || callee.property.name != "defineProperty" {
            return;
        }
        let target = ce.arguments.first().and_then(|a| a.as_expression());
        let key = ce.arguments.get(1).and_then(|a| a.as_expression());
        if let (Some(target), Some(Expression::StringLiteral(key))) = (target, key)
            && (is_identifier(target, "exports") || is_module_exports(target))
        {
            self.has_exports_access = true;
            if key.value == "__esModule" {
                self.exports.es_module_marker = true;
            } else {
                self.exports.names.insert(key.value.to_string());
            }
        }
    }
}

fn is_identifier(expr: &Expression, name: &str) -> bool {
    matches!(expr, Expression::Identifier(ident) if ident.name == name)
}

fn is_module_exports(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::StaticMemberExpression(me)
            if is_identifier(&me.object, "module") && me.property.name == "exports"
    )
}

fn source_type_for(path: &str) -> SourceType {
    let extension = FileExtension::from_path(path);
    let is_typescript = extension.is_declaration()
        || matches!(path.rsplit_once('.').map(|(_, ext)| ext), Some("ts" | "mts" | "cts"));

    // Everything is parsed as a module so import/export are always recognised
    SourceType::default()
        .with_module(true)
        .with_typescript(is_typescript)
        .with_typescript_definition(extension.is_declaration())
}
