use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuillError {
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Duplicate plugin: {0}")]
    DuplicatePlugin(String),

    #[error("Invalid plugin descriptor: plugin={plugin}, {message}")]
    InvalidDescriptor { plugin: String, message: String },

    #[error("Unknown tool: {plugin}/{tool}")]
    UnknownTool { plugin: String, tool: String },

    #[error("Invalid tool input: {plugin}/{tool}, {message}")]
    InvalidInput {
        plugin: String,
        tool: String,
        message: String,
    },

    #[error("Tool execution error: plugin={plugin}, tool={tool}, {message}")]
    ToolExecution {
        plugin: String,
        tool: String,
        message: String,
    },

    #[error("Reducer required: plugin={0}")]
    ReducerRequired(String),

    #[error("Corrupt state file {path}: {message}")]
    CorruptData { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type QuillResult<T> = Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = QuillError::UnknownPlugin("notes".into());
        assert_eq!(err.to_string(), "Unknown plugin: notes");

        let err = QuillError::UnknownTool {
            plugin: "notes".into(),
            tool: "save".into(),
        };
        assert_eq!(err.to_string(), "Unknown tool: notes/save");

        let err = QuillError::InvalidInput {
            plugin: "notes".into(),
            tool: "save_note".into(),
            message: "\"text\" is a required property".into(),
        };
        assert!(err.to_string().contains("required property"));

        let err = QuillError::ToolExecution {
            plugin: "notes".into(),
            tool: "save_note".into(),
            message: "disk full".into(),
        };
        assert!(err.to_string().contains("plugin=notes"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QuillError>();
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QuillError = io_err.into();
        assert!(matches!(err, QuillError::Io(_)));
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: QuillError = json_err.into();
        assert!(matches!(err, QuillError::Serialization(_)));
    }
}
