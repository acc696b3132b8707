//! Classification of fetched notifications and rendering of the email batch.
use crate::model::{NotificationKind, NotificationRecord, RenderedMessage, DESTINATION_URL};

/// Rendered in place of a missing project title.
const MISSING_TITLE: &str = "null";

/// Records sharing one content type, in fetch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationGroup<'a> {
    pub kind: NotificationKind,
    pub records: Vec<&'a NotificationRecord>,
}

/// Partition records by content type. Groups come out in
/// [`NotificationKind::ALL`] order; records with an unrecognized content
/// type are left out of every group.
pub fn classify(records: &[NotificationRecord]) -> Vec<NotificationGroup<'_>> {
    NotificationKind::ALL
        .iter()
        .map(|&kind| NotificationGroup {
            kind,
            records: records
                .iter()
                .filter(|record| record.kind() == Some(kind))
                .collect(),
        })
        .collect()
}

/// Render a single record. `None` when its content type is unrecognized or
/// it has no address to send to.
pub fn render(record: &NotificationRecord) -> Option<RenderedMessage> {
    let kind = record.kind()?;
    let email = record.preferred_email.clone()?;
    let title = record.title.as_deref().unwrap_or(MISSING_TITLE);
    let (subject, html) = match kind {
        NotificationKind::ProjectExpired => (
            format!("Oops... Your project {} is expired...", title),
            format!(
                "<div>Your project is expired. Go to <a href=\"{}\" target=\"_blank\">21 Days</a> to create a new project now!</div>",
                DESTINATION_URL
            ),
        ),
        NotificationKind::EntryMissed => (
            format!("Hey! You missed an entry for project {}!", title),
            format!(
                "<div>You missed an entry. Go to <a href=\"{}\" target=\"_blank\">21 Days</a> to create a new entry now or the project will be expired soon!</div>",
                DESTINATION_URL
            ),
        ),
    };
    Some(RenderedMessage {
        email,
        subject,
        html,
    })
}

/// Flatten the groups into the single ordered batch handed to the mailer.
pub fn render_batch(groups: &[NotificationGroup<'_>]) -> Vec<RenderedMessage> {
    groups
        .iter()
        .flat_map(|group| group.records.iter().filter_map(|record| render(record)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationContent, RowId};

    fn record(id: i64, content: &str, title: &str) -> NotificationRecord {
        NotificationRecord {
            id: RowId::Int(id),
            project_id: RowId::Int(id * 10),
            preferred_email: Some(format!("user{}@example.com", id)),
            content: Some(NotificationContent::from(content.to_string())),
            title: Some(title.into()),
        }
    }

    #[test]
    fn classify_groups_by_kind_in_fetch_order() {
        let records = vec![
            record(1, "entry_missed", "One"),
            record(2, "project_expired", "Two"),
            record(3, "entry_missed", "Three"),
        ];
        let groups = classify(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].kind, NotificationKind::ProjectExpired);
        assert_eq!(groups[0].records.len(), 1);
        assert_eq!(groups[0].records[0].title.as_deref(), Some("Two"));
        assert_eq!(groups[1].kind, NotificationKind::EntryMissed);
        let ids: Vec<&RowId> = groups[1].records.iter().map(|r| &r.id).collect();
        assert_eq!(ids, vec![&RowId::Int(1), &RowId::Int(3)]);
    }

    #[test]
    fn unrecognized_content_is_not_rendered() {
        let records = vec![record(1, "weekly_digest", "Gamma")];
        assert!(render(&records[0]).is_none());
        let groups = classify(&records);
        assert!(groups.iter().all(|g| g.records.is_empty()));
        assert!(render_batch(&groups).is_empty());
    }

    #[test]
    fn batch_renders_both_templates() {
        let records = vec![
            record(1, "project_expired", "Alpha"),
            record(2, "entry_missed", "Beta"),
            record(3, "weekly_digest", "Gamma"),
        ];
        let batch = render_batch(&classify(&records));
        assert_eq!(batch.len(), 2);

        assert_eq!(batch[0].email, "user1@example.com");
        assert_eq!(batch[0].subject, "Oops... Your project Alpha is expired...");
        assert!(batch[0].html.contains("href=\"https://21-days.mikacheng.com\""));
        assert!(batch[0].html.contains("create a new project now"));

        assert_eq!(batch[1].email, "user2@example.com");
        assert_eq!(batch[1].subject, "Hey! You missed an entry for project Beta!");
        assert!(batch[1].html.contains("href=\"https://21-days.mikacheng.com\""));
        assert!(batch[1].html.contains("expired soon"));
    }

    #[test]
    fn record_without_address_is_left_out() {
        let mut no_email = record(1, "project_expired", "Alpha");
        no_email.preferred_email = None;
        let records = vec![no_email, record(2, "entry_missed", "Beta")];

        let groups = classify(&records);
        assert_eq!(groups[0].records.len(), 1);
        let batch = render_batch(&groups);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].email, "user2@example.com");
    }

    #[test]
    fn missing_title_and_content_render_as_the_store_left_them() {
        let mut untitled = record(1, "project_expired", "");
        untitled.title = None;
        assert_eq!(
            render(&untitled).unwrap().subject,
            "Oops... Your project null is expired..."
        );

        let mut no_content = record(2, "entry_missed", "Beta");
        no_content.content = None;
        assert!(render(&no_content).is_none());
        assert!(classify(std::slice::from_ref(&no_content))
            .iter()
            .all(|g| g.records.is_empty()));
    }

    #[test]
    fn render_matches_batch_rendering() {
        let r = record(4, "entry_missed", "Delta");
        let batch = render_batch(&classify(std::slice::from_ref(&r)));
        assert_eq!(render(&r), batch.into_iter().next());
    }
}
