use clap::Args;
use log::debug;
use typeswrong_core::ResolutionKind;

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct Config {
    /// Resolution algorithms to simulate (comma separated)
    #[arg(long = "resolution", value_delimiter = ',', default_values_t = ResolutionKind::ALL)]
    pub resolution_kinds: Vec<ResolutionKind>,

    /// Extra export condition enabled in every resolution (repeatable)
    #[arg(long = "condition")]
    pub conditions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self { resolution_kinds: ResolutionKind::ALL.to_vec(), conditions: Vec::new() }
    }
}

impl Config {
    /// Configured resolution kinds in canonical order without duplicates.
    ///
    /// An empty selection means every kind.
    pub fn resolution_kinds(&self) -> Vec<ResolutionKind> {
        if self.resolution_kinds.is_empty() {
            debug!("No resolution kinds configured, using all of them");
            return ResolutionKind::ALL.to_vec();
        }
        let mut kinds = self.resolution_kinds.clone();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}
