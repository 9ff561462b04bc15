use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ========== PAGE LOAD ==========
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLoadRequest {
    pub form_token: String,
}

/// Page state as returned by the `pageload` webhook. Every field is optional;
/// an empty object is the fallback when the backend cannot be reached.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub available_users: Option<u32>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub active_users: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<String>, // delimited list of already-invited addresses
    #[serde(default, rename = "paymentemail", skip_serializing_if = "Option::is_none")]
    pub payment_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<bool>,
}

impl PageState {
    pub fn is_submitted(&self) -> bool {
        self.submitted.unwrap_or(false)
    }

    /// Remaining invitation seats, only when both counts are known.
    pub fn seats_remaining(&self) -> Option<u32> {
        match (self.available_users, self.active_users) {
            (Some(available), Some(active)) => Some(available.saturating_sub(active)),
            _ => None,
        }
    }

    /// Existing addresses, normalised for comparison.
    pub fn existing_emails(&self) -> Vec<String> {
        self.emails
            .as_deref()
            .unwrap_or("")
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .collect()
    }

    /// Default Slack invite address; blank values count as absent.
    pub fn default_email(&self) -> Option<&str> {
        self.payment_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Seat counts arrive as numbers or numeric strings. Anything else is treated
/// as unknown instead of failing the whole page load.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let count = match &value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };

    match count {
        Some(n) => Ok(Some(u32::try_from(n).unwrap_or(u32::MAX))),
        None => {
            tracing::warn!("Ignoring unusable seat count: {:?}", value);
            Ok(None)
        }
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Simple `local@domain.tld` shape check, the same strictness as a browser
/// `type="email"` input.
pub fn is_plausible_email(raw: &str) -> bool {
    let email = raw.trim();
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

// ========== KEY VERIFICATION ==========
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyVerifyRequest {
    pub open_router_api_key: String,
    pub flux_api_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyCheck {
    Pass,
    Fail,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyVerifyResponse {
    pub open_router_pass: KeyCheck,
    pub flux_pass: KeyCheck,
}

impl KeyVerifyResponse {
    pub fn both_failed() -> Self {
        Self {
            open_router_pass: KeyCheck::Fail,
            flux_pass: KeyCheck::Fail,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.open_router_pass == KeyCheck::Pass && self.flux_pass == KeyCheck::Pass
    }
}

// ========== ANSWERS ==========
/// Field names follow the backend contract verbatim.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Answers {
    pub company_name: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "openRouterApiKey")]
    pub open_router_api_key: String,
    #[serde(rename = "fluxApiKey")]
    pub flux_api_key: String,
    pub apikeyspassed: bool,
    #[serde(rename = "slackEmailIsFine")]
    pub slack_email_is_fine: bool,
    #[serde(rename = "formToken")]
    pub form_token: String,
    #[serde(rename = "prefered_email_addressSlack")]
    pub preferred_email_address_slack: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SubmitAnswersRequest {
    pub answers: Answers,
}

// ========== INVITEES ==========
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Invitee {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitUsersRequest {
    pub form_token: String,
    pub users: Vec<Invitee>,
}

/// Outcome of a submission webhook once failures have been normalised.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Ack {
    Delivered,
    Failed,
}

impl Ack {
    pub fn is_delivered(self) -> bool {
        matches!(self, Ack::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_state_parses_backend_names() {
        let state: PageState = serde_json::from_str(
            r#"{"name":"Dana","availableUsers":5,"activeUsers":2,"paymentemail":"dana@co.com"}"#,
        )
        .unwrap();

        assert_eq!(state.name.as_deref(), Some("Dana"));
        assert_eq!(state.seats_remaining(), Some(3));
        assert_eq!(state.default_email(), Some("dana@co.com"));
        assert!(!state.is_submitted());
    }

    #[test]
    fn test_malformed_counts_keep_the_rest_of_the_page() {
        let state: PageState = serde_json::from_str(
            r#"{"name":"Dana","availableUsers":"5","activeUsers":-1,"paymentemail":"dana@co.com"}"#,
        )
        .unwrap();

        assert_eq!(state.name.as_deref(), Some("Dana"));
        assert_eq!(state.available_users, Some(5));
        assert_eq!(state.active_users, None);
        assert_eq!(state.seats_remaining(), None);
        assert_eq!(state.default_email(), Some("dana@co.com"));

        let odd: PageState =
            serde_json::from_str(r#"{"availableUsers":"lots","activeUsers":null}"#).unwrap();
        assert_eq!(odd.available_users, None);
        assert_eq!(odd.active_users, None);
    }

    #[test]
    fn test_seats_need_both_counts_and_saturate() {
        let partial = PageState {
            available_users: Some(4),
            ..Default::default()
        };
        assert_eq!(partial.seats_remaining(), None);

        let over = PageState {
            available_users: Some(2),
            active_users: Some(5),
            ..Default::default()
        };
        assert_eq!(over.seats_remaining(), Some(0));
    }

    #[test]
    fn test_existing_emails_split_and_normalised() {
        let state = PageState {
            emails: Some(" A@x.com, b@y.org;c@z.io\n".to_string()),
            ..Default::default()
        };
        assert_eq!(state.existing_emails(), vec!["a@x.com", "b@y.org", "c@z.io"]);
    }

    #[test]
    fn test_plausible_email() {
        assert!(is_plausible_email("a@x.com"));
        assert!(is_plausible_email("  first.last@sub.example.io "));
        assert!(!is_plausible_email(""));
        assert!(!is_plausible_email("ax.com"));
        assert!(!is_plausible_email("@x.com"));
        assert!(!is_plausible_email("a@x"));
        assert!(!is_plausible_email("a@.com"));
        assert!(!is_plausible_email("a b@x.com"));
        assert!(!is_plausible_email("a@b@x.com"));
    }

    #[test]
    fn test_answers_use_backend_field_names() {
        let payload = SubmitAnswersRequest {
            answers: Answers {
                company_name: "Acme".to_string(),
                first_name: "Dana".to_string(),
                open_router_api_key: "sk-or".to_string(),
                flux_api_key: "bfl".to_string(),
                apikeyspassed: true,
                slack_email_is_fine: false,
                form_token: "tok123".to_string(),
                preferred_email_address_slack: "dana@co.com".to_string(),
            },
        };

        let value = serde_json::to_value(&payload).unwrap();
        let answers = &value["answers"];
        assert_eq!(answers["company_name"], "Acme");
        assert_eq!(answers["firstName"], "Dana");
        assert_eq!(answers["apikeyspassed"], true);
        assert_eq!(answers["slackEmailIsFine"], false);
        assert_eq!(answers["formToken"], "tok123");
        assert_eq!(answers["prefered_email_addressSlack"], "dana@co.com");
    }
}
