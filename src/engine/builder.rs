use crate::{
    Result,
    engine::{StatsEngine, config::EngineConfig, locks::MonthLocks},
    storage::{ContributorDirectory, ObjectStore},
};

pub struct StatsEngineBuilder<S, D> {
    store: S,
    directory: D,
    config: EngineConfig,
}

impl<S, D> StatsEngineBuilder<S, D>
where
    S: ObjectStore,
    D: ContributorDirectory,
{
    pub fn new(store: S, directory: D) -> Self {
        Self {
            store,
            directory,
            config: EngineConfig::default(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn file_stem(mut self, stem: impl Into<String>) -> Self {
        self.config.file_stem = stem.into();
        self
    }

    pub fn title_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.title_suffix = suffix.into();
        self
    }

    pub fn build(self) -> Result<StatsEngine<S, D>> {
        self.config.validate()?;
        Ok(StatsEngine {
            store: self.store,
            directory: self.directory,
            config: self.config,
            locks: MonthLocks::new(),
        })
    }
}
