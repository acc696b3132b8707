use serde::Deserialize;

use crate::model::{NotificationContent, NotificationRecord, RowId};

/// Row returned by the `get_emails_to_be_sent` procedure. `e_id` is the
/// notification row, `id` the project it belongs to. The joined columns
/// may be null or absent.
#[derive(Deserialize, Debug)]
pub struct EmailToBeSentRow {
    pub e_id: RowId,
    pub id: RowId,
    #[serde(default)]
    pub preferred_email: Option<String>,
    #[serde(default)]
    pub content: Option<NotificationContent>,
    #[serde(default)]
    pub title: Option<String>,
}

impl From<EmailToBeSentRow> for NotificationRecord {
    fn from(row: EmailToBeSentRow) -> Self {
        NotificationRecord {
            id: row.e_id,
            project_id: row.id,
            preferred_email: row.preferred_email,
            content: row.content,
            title: row.title,
        }
    }
}

/// PostgREST error body.
#[derive(Deserialize, Debug, Default)]
pub struct PostgrestError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_columns_do_not_reject_the_batch() {
        let rows: Vec<EmailToBeSentRow> = serde_json::from_value(json!([
            {
                "e_id": 1,
                "id": 10,
                "preferred_email": "a@example.com",
                "content": "project_expired",
                "title": "Alpha"
            },
            {
                "e_id": 2,
                "id": 20,
                "preferred_email": null,
                "content": null,
                "title": null
            },
            { "e_id": 3, "id": 30 }
        ]))
        .unwrap();
        let records: Vec<NotificationRecord> = rows.into_iter().map(Into::into).collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].preferred_email.as_deref(), Some("a@example.com"));
        assert_eq!(records[1].preferred_email, None);
        assert_eq!(records[1].content, None);
        assert_eq!(records[2].title, None);
        assert_eq!(records[2].id, RowId::Int(3));
    }
}
