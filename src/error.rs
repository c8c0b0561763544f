use thiserror::Error;

/// What went wrong with a stack operation, as far as the user needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stack name is taken; the user must pick another one.
    AlreadyExists,
    /// Another apply or destroy is running against the stack; retry later.
    ConcurrentUpdate,
    Unclassified,
}

#[derive(Error, Debug)]
pub enum StackError {
    #[error("stack '{0}' already exists")]
    AlreadyExists(String),

    #[error("stack '{0}' already has an update in progress")]
    ConcurrentUpdate(String),

    #[error("no stack named '{0}' found")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

impl StackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StackError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StackError::ConcurrentUpdate(_) => ErrorKind::ConcurrentUpdate,
            StackError::NotFound(_) | StackError::InvalidInput(_) | StackError::Unclassified(_) => ErrorKind::Unclassified,
        }
    }
}

pub type StackResult<T> = Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_invalid_input_fold_into_unclassified() {
        assert_eq!(StackError::NotFound("demo".into()).kind(), ErrorKind::Unclassified);
        assert_eq!(StackError::InvalidInput("bad".into()).kind(), ErrorKind::Unclassified);
        assert_eq!(StackError::AlreadyExists("demo".into()).kind(), ErrorKind::AlreadyExists);
        assert_eq!(StackError::ConcurrentUpdate("demo".into()).kind(), ErrorKind::ConcurrentUpdate);
    }

    #[test]
    fn unclassified_keeps_the_context_chain() {
        let err: StackError = anyhow::anyhow!("exit status 255").context("pulumi up").into();
        assert_eq!(format!("{err:#}"), "pulumi up: exit status 255");
    }
}
