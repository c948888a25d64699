//! Problem detection for npm packages that ship TypeScript declarations.
//!
//! Every entry point of a package is resolved under each module resolution
//! algorithm twice, once for declaration files and once for the JavaScript
//! that runs. Disagreements between the two are reported as [`Problem`]s.
//!
//! # Examples
//!
//! ```no_run
//! use typeswrong_analysis::{Config, analyze, get_problems, group_by_kind};
//! use typeswrong_core::Vfs;
//!
//! # fn main() -> typeswrong_core::Result<()> {
//! let vfs = Vfs::from_files(vec![
//!     ("package.json", br#"{"name":"pkg","main":"index.js"}"#.to_vec()),
//!     ("index.js", b"exports.hello = () => {};".to_vec()),
//!     ("index.d.ts", b"export declare function hello(): void;".to_vec()),
//! ])?;
//!
//! let analysis = analyze(&vfs, &Config::default())?;
//! for (kind, problems) in group_by_kind(get_problems(&analysis, None)) {
//!     println!("{}: {}", kind, problems.len());
//! }
//! # Ok(())
//! # }
//! ```

mod analysis;
mod checker;
mod config;
mod entrypoints;
mod types;

// Re-export public API
pub use analysis::{Analysis, get_problems, group_by_kind};
pub use checker::{analyze, analyze_from_vfs};
pub use config::Config;
pub use entrypoints::enumerate_entry_points;
pub use types::{
    Cell, CellResolution, EntryPoint, MismatchSource, Problem, ProblemDetails, ProblemKind,
};
