use thiserror::Error;

/// Failures that abort the CLI before an envelope can be produced.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not read {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not render output: {0}")]
    Render(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::FileRead { .. } | Self::FileParse { .. } => 2,
            Self::Render(_) => 4,
        }
    }
}
