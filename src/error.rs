use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Failure raised by the batch mailer.
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("mailer rejected batch with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("mailer request failed: {0:#}")]
    Transport(anyhow::Error),
}

/// Errors captured by a dispatch run. None of these escape the run; they end
/// up in the terminal [`crate::dispatch::RunResult`] or in the logs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("error fetching emails to be sent: {0:#}")]
    Source(anyhow::Error),
    #[error(transparent)]
    Mailer(#[from] MailerError),
    #[error("status write-back failed: {0:#}")]
    Reconcile(anyhow::Error),
    #[error("dispatch panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Source(_) => "source",
            DispatchError::Mailer(_) => "mailer",
            DispatchError::Reconcile(_) => "reconcile",
            DispatchError::Panicked(_) => "panic",
        }
    }
}

impl Serialize for DispatchError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DispatchError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;

    #[test]
    fn serializes_kind_and_message() {
        let err = DispatchError::Source(anyhow!("connection refused"));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({
                "kind": "source",
                "message": "error fetching emails to be sent: connection refused",
            })
        );

        let err = DispatchError::from(MailerError::Rejected {
            status: 500,
            message: "quota exceeded".into(),
        });
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "mailer");
        assert_eq!(
            value["message"],
            "mailer rejected batch with status 500: quota exceeded"
        );
    }
}
