use serde::Serialize;
use std::collections::HashSet;

use crate::backend::Backend;
use crate::error::InvitationError;
use crate::token::FormToken;
use crate::types::{is_plausible_email, normalize_email, Invitee, PageState};

/// Teammate invitation step. The list is validated locally before anything
/// is sent and submitted all-or-nothing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationForm {
    entries: Vec<Invitee>,
    seats_remaining: Option<u32>,
    #[serde(skip)]
    existing_emails: Vec<String>,
    submitted: bool,
}

impl InvitationForm {
    /// Starts with one blank row.
    pub fn new(page: &PageState) -> Self {
        Self {
            entries: vec![Invitee::default()],
            seats_remaining: page.seats_remaining(),
            existing_emails: page.existing_emails(),
            submitted: false,
        }
    }

    pub fn entries(&self) -> &[Invitee] {
        &self.entries
    }

    pub fn seats_remaining(&self) -> Option<u32> {
        self.seats_remaining
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Whether another row may be added without exceeding the seat count.
    pub fn can_add(&self) -> bool {
        !self.submitted
            && self
                .seats_remaining
                .map_or(true, |seats| (self.entries.len() as u64) < u64::from(seats))
    }

    fn ensure_open(&self) -> Result<(), InvitationError> {
        if self.submitted {
            Err(InvitationError::AlreadySubmitted)
        } else {
            Ok(())
        }
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut Invitee, InvitationError> {
        self.ensure_open()?;
        self.entries
            .get_mut(index)
            .ok_or(InvitationError::NoSuchEntry { index })
    }

    pub fn add_entry(&mut self) -> Result<usize, InvitationError> {
        self.ensure_open()?;
        self.entries.push(Invitee::default());
        Ok(self.entries.len() - 1)
    }

    pub fn remove_entry(&mut self, index: usize) -> Result<Invitee, InvitationError> {
        self.ensure_open()?;
        if index >= self.entries.len() {
            return Err(InvitationError::NoSuchEntry { index });
        }
        Ok(self.entries.remove(index))
    }

    pub fn set_name(&mut self, index: usize, name: impl Into<String>) -> Result<(), InvitationError> {
        self.entry_mut(index)?.name = name.into();
        Ok(())
    }

    pub fn set_email(
        &mut self,
        index: usize,
        email: impl Into<String>,
    ) -> Result<(), InvitationError> {
        self.entry_mut(index)?.email = email.into();
        Ok(())
    }

    pub fn replace_entries(&mut self, entries: Vec<Invitee>) -> Result<(), InvitationError> {
        self.ensure_open()?;
        self.entries = entries;
        Ok(())
    }

    /// Local checks, in order: something to send, every row filled in with a
    /// plausible email, seat count, then duplicates.
    pub fn validate(&self) -> Result<(), InvitationError> {
        if self.entries.is_empty() {
            return Err(InvitationError::NoInvitees);
        }

        for (index, entry) in self.entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(InvitationError::EmptyName { index });
            }
            if !is_plausible_email(&entry.email) {
                return Err(InvitationError::InvalidEmail { index });
            }
        }

        if let Some(seats) = self.seats_remaining {
            if self.entries.len() as u64 > u64::from(seats) {
                return Err(InvitationError::TooManyInvitees { seats });
            }
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            let email = normalize_email(&entry.email);
            if self.existing_emails.contains(&email) {
                return Err(InvitationError::ExistingEmail { email });
            }
            if !seen.insert(email.clone()) {
                return Err(InvitationError::DuplicateEmail { email });
            }
        }

        Ok(())
    }

    /// Validate, then send the whole list. A backend rejection leaves the
    /// list untouched so it can be corrected and resent.
    pub async fn submit(
        &mut self,
        backend: &Backend,
        form_token: &FormToken,
    ) -> Result<usize, InvitationError> {
        self.ensure_open()?;
        self.validate()?;

        let users: Vec<Invitee> = self
            .entries
            .iter()
            .map(|entry| Invitee {
                name: entry.name.trim().to_string(),
                email: entry.email.trim().to_string(),
            })
            .collect();
        let count = users.len();

        if !backend.submitusers(form_token.as_str(), users).await.is_delivered() {
            return Err(InvitationError::SubmissionFailed);
        }

        tracing::info!("Invited {} user(s) for token {}", count, form_token);
        self.submitted = true;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notices::NoticeLog;
    use crate::testing::{FakeWebhook, WebhookCall};
    use std::sync::Arc;

    fn page(available: u32, active: u32) -> PageState {
        PageState {
            available_users: Some(available),
            active_users: Some(active),
            emails: Some("owner@x.com, lead@x.com".to_string()),
            ..Default::default()
        }
    }

    fn invitee(name: &str, email: &str) -> Invitee {
        Invitee {
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    fn form_with(page: &PageState, entries: &[(&str, &str)]) -> InvitationForm {
        let mut form = InvitationForm::new(page);
        form.replace_entries(entries.iter().map(|(n, e)| invitee(n, e)).collect())
            .unwrap();
        form
    }

    fn backend_for(fake: &Arc<FakeWebhook>) -> Backend {
        Backend::new(fake.clone(), Arc::new(NoticeLog::new()))
    }

    #[test]
    fn test_starts_with_one_blank_row() {
        let form = InvitationForm::new(&page(5, 2));
        assert_eq!(form.entries(), &[Invitee::default()]);
        assert_eq!(form.seats_remaining(), Some(3));
        assert!(form.can_add());
    }

    #[test]
    fn test_edit_rows() {
        let mut form = InvitationForm::new(&page(5, 2));
        let second = form.add_entry().unwrap();
        form.set_name(second, "B").unwrap();
        form.set_email(second, "b@x.com").unwrap();
        form.set_name(0, "A").unwrap();

        let removed = form.remove_entry(0).unwrap();
        assert_eq!(removed.name, "A");
        assert_eq!(form.entries(), &[invitee("B", "b@x.com")]);
        assert_eq!(
            form.set_email(4, "z@x.com"),
            Err(InvitationError::NoSuchEntry { index: 4 })
        );
    }

    #[test]
    fn test_duplicate_rejected_regardless_of_seats() {
        let form = form_with(&page(5, 2), &[("A", "a@x.com"), ("B", "a@x.com")]);
        assert_eq!(
            form.validate(),
            Err(InvitationError::DuplicateEmail {
                email: "a@x.com".to_string()
            })
        );

        let form = form_with(&page(5, 2), &[("A", "a@x.com"), ("B", " A@X.com ")]);
        assert!(matches!(form.validate(), Err(InvitationError::DuplicateEmail { .. })));
    }

    #[test]
    fn test_existing_email_rejected() {
        let form = form_with(&page(5, 2), &[("Lead", "Lead@x.com")]);
        assert_eq!(
            form.validate(),
            Err(InvitationError::ExistingEmail {
                email: "lead@x.com".to_string()
            })
        );
    }

    #[test]
    fn test_field_checks() {
        let form = form_with(&page(5, 2), &[("A", "a@x.com"), (" ", "b@x.com")]);
        assert_eq!(form.validate(), Err(InvitationError::EmptyName { index: 1 }));

        let form = form_with(&page(5, 2), &[("A", "a@x")]);
        assert_eq!(form.validate(), Err(InvitationError::InvalidEmail { index: 0 }));

        let form = form_with(&page(5, 2), &[]);
        assert_eq!(form.validate(), Err(InvitationError::NoInvitees));
    }

    #[test]
    fn test_seat_limit() {
        let entries = [("A", "a@x.com"), ("B", "b@x.com"), ("C", "c@x.com")];
        let form = form_with(&page(4, 2), &entries);
        assert_eq!(form.validate(), Err(InvitationError::TooManyInvitees { seats: 2 }));
        assert!(!form.can_add());

        let unknown = PageState::default();
        let form = form_with(&unknown, &entries);
        assert_eq!(form.validate(), Ok(()));
        assert!(form.can_add());
    }

    #[tokio::test]
    async fn test_invalid_list_makes_no_call() {
        let fake = Arc::new(FakeWebhook::new());
        let backend = backend_for(&fake);
        let token = FormToken::new("tok123").unwrap();
        let mut form = form_with(&page(5, 2), &[("A", "a@x.com"), ("B", "a@x.com")]);

        let result = form.submit(&backend, &token).await;

        assert!(matches!(result, Err(InvitationError::DuplicateEmail { .. })));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_submit_sends_trimmed_list_and_closes() {
        let fake = Arc::new(FakeWebhook::new());
        let backend = backend_for(&fake);
        let token = FormToken::new("tok123").unwrap();
        let mut form = form_with(&page(5, 2), &[(" A ", " a@x.com"), ("B", "b@x.com")]);

        assert_eq!(form.submit(&backend, &token).await, Ok(2));
        assert!(form.is_submitted());
        assert_eq!(
            fake.calls(),
            vec![WebhookCall::SubmitUsers(crate::types::SubmitUsersRequest {
                form_token: "tok123".to_string(),
                users: vec![invitee("A", "a@x.com"), invitee("B", "b@x.com")],
            })]
        );

        assert_eq!(form.add_entry(), Err(InvitationError::AlreadySubmitted));
        assert_eq!(
            form.submit(&backend, &token).await,
            Err(InvitationError::AlreadySubmitted)
        );
    }

    #[tokio::test]
    async fn test_backend_rejection_keeps_list() {
        let fake = Arc::new(FakeWebhook::new().rejecting_users());
        let backend = backend_for(&fake);
        let token = FormToken::new("tok123").unwrap();
        let mut form = form_with(&page(5, 2), &[("A", "a@x.com")]);

        assert_eq!(
            form.submit(&backend, &token).await,
            Err(InvitationError::SubmissionFailed)
        );
        assert!(!form.is_submitted());
        assert_eq!(form.entries(), &[invitee("A", "a@x.com")]);
    }
}
