use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr_tail}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Failed {
        program: String,
        exit_code: Option<i32>,
        /// Last lines of stderr.
        stderr_tail: String,
    },

    #[error("unparsable probe output: {0}")]
    BadProbe(#[from] serde_json::Error),

    #[error("no video stream in {0}")]
    NoVideoStream(String),

    #[error("media I/O: {0}")]
    Io(#[from] std::io::Error),
}
