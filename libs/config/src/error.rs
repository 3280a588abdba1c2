#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("worker #{index} has an empty name")]
    EmptyWorkerName { index: usize },

    #[error("worker `{0}` is declared more than once")]
    DuplicateWorker(String),

    #[error("channel `{0}` is declared more than once")]
    DuplicateChannel(String),

    #[error("worker `{worker}` references itself as {role}")]
    SelfReference { worker: String, role: &'static str },

    #[error("worker `{worker}` references undeclared {role} `{reference}`")]
    UnknownReference {
        worker: String,
        reference: String,
        role: &'static str,
    },

    #[error("failed to expand `{path}`: {reason}")]
    Expand { path: String, reason: String },
}
