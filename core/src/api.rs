use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::AuthFlow;
use crate::dates;
use crate::error::{Error, RemoteErrorKind, Result};
use crate::models::{MonthDay, OneOrMany, UserProfile};
use crate::oauth::{self, Params};
use crate::tokens::TokenPair;
use crate::transport::{HttpTransport, TransportError};

/// Retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Entries fetched for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayEntries {
    pub date: NaiveDate,
    pub entries: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDay {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RangeFetch {
    pub days: Vec<DayEntries>,
    pub skipped: Vec<SkippedDay>,
}

impl RangeFetch {
    /// Every fetched entry, in day order.
    #[must_use]
    pub fn entries(&self) -> Vec<Value> {
        self.days
            .iter()
            .flat_map(|d| d.entries.iter().cloned())
            .collect()
    }
}

/// Why an attempt failed in a way that may be retried.
enum Retryable {
    Token { rejected: TokenPair, error: Error },
    Network(TransportError),
}

/// Signed calls against the REST endpoint.
pub struct ApiClient {
    auth: AuthFlow,
    transport: Arc<dyn HttpTransport>,
    tokens: Option<TokenPair>,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(auth: AuthFlow, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            auth,
            transport,
            tokens: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn auth_mut(&mut self) -> &mut AuthFlow {
        &mut self.auth
    }

    fn access_tokens(&mut self) -> Result<TokenPair> {
        if let Some(tokens) = &self.tokens {
            return Ok(tokens.clone());
        }
        let tokens = self.auth.authenticate()?;
        self.tokens = Some(tokens.clone());
        Ok(tokens)
    }

    fn signed_query(&self, method: &str, params: &[(&str, String)], tokens: &TokenPair) -> Result<Params> {
        let credentials = self.auth.credentials();
        let mut query: Params = vec![
            ("method".to_string(), method.to_string()),
            ("format".to_string(), "json".to_string()),
        ];
        query.extend(oauth::protocol_params(
            &credentials.consumer_key,
            &oauth::nonce(),
            oauth::timestamp(),
        ));
        query.push(("oauth_token".to_string(), tokens.token.clone()));
        query.extend(params.iter().map(|(k, v)| ((*k).to_string(), v.clone())));

        let signature = oauth::sign(
            "GET",
            &self.auth.endpoints().api,
            &query,
            &credentials.consumer_secret,
            Some(&tokens.secret),
        )?;
        query.push(("oauth_signature".to_string(), signature));
        Ok(query)
    }

    /// Call a remote method and return the decoded JSON body.
    ///
    /// Token rejections trigger a refresh and transport failures a plain
    /// retry, at most `max_retries` times after the first attempt.
    pub fn call(&mut self, method: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.auth.endpoints().api.clone();
        let mut attempt = 0;
        loop {
            let tokens = self.access_tokens()?;
            let query = self.signed_query(method, params, &tokens)?;
            debug!(method, attempt, "Calling remote API");

            let failure = match self.transport.get(&url, &query) {
                Ok(response) if response.is_ok() => match parse_envelope(&response.body) {
                    Ok(value) => return Ok(value),
                    Err(
                        error @ Error::Remote {
                            kind: RemoteErrorKind::Authentication,
                            ..
                        },
                    ) => Retryable::Token {
                        rejected: tokens,
                        error,
                    },
                    Err(e) => return Err(e),
                },
                Ok(response) if response.body.to_lowercase().contains("token") => {
                    Retryable::Token {
                        rejected: tokens,
                        error: Error::Api {
                            status: response.status,
                            body: response.body,
                        },
                    }
                }
                Ok(response) => {
                    return Err(Error::Api {
                        status: response.status,
                        body: response.body,
                    });
                }
                Err(e) => Retryable::Network(e),
            };

            if attempt >= self.max_retries {
                return Err(match failure {
                    Retryable::Token { error, .. } => error,
                    Retryable::Network(e) => Error::Network(e.to_string()),
                });
            }
            attempt += 1;

            match failure {
                Retryable::Token { rejected, error } => {
                    warn!(method, attempt, error = %error, "Access token rejected, refreshing");
                    self.tokens = None;
                    self.tokens = Some(self.auth.refresh(&rejected)?);
                }
                Retryable::Network(e) => {
                    warn!(method, attempt, error = %e, "Request failed, retrying");
                }
            }
        }
    }

    pub fn profile(&mut self) -> Result<UserProfile> {
        let body = self.call("profile.get", &[])?;
        let profile = body
            .get("profile")
            .ok_or_else(|| Error::Decode("response has no 'profile'".to_string()))?;
        serde_json::from_value(profile.clone()).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Raw diary entries for one day.
    pub fn food_entries_for_day(&mut self, date: NaiveDate) -> Result<Vec<Value>> {
        let days = dates::days_since_epoch(date);
        let body = self.call("food_entries.get.v2", &[("date", days.to_string())])?;
        Ok(match body.get("food_entries").and_then(|f| f.get("food_entry")) {
            Some(Value::Array(entries)) => entries.clone(),
            Some(entry @ Value::Object(_)) => vec![entry.clone()],
            _ => Vec::new(),
        })
    }

    /// One call per day from `start` to `end` inclusive. A failing day is
    /// recorded and skipped; only a failed handshake aborts the range.
    pub fn food_entries_range(&mut self, start: NaiveDate, end: NaiveDate) -> Result<RangeFetch> {
        let mut fetch = RangeFetch::default();
        for date in dates::days_inclusive(start, end) {
            match self.food_entries_for_day(date) {
                Ok(entries) => {
                    debug!(%date, count = entries.len(), "Fetched entries");
                    fetch.days.push(DayEntries { date, entries });
                }
                Err(e @ Error::AuthFlow(_)) => return Err(e),
                Err(e) => {
                    warn!(%date, error = %e, "Skipping day");
                    fetch.skipped.push(SkippedDay {
                        date,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            days = fetch.days.len(),
            skipped = fetch.skipped.len(),
            "Fetched date range"
        );
        Ok(fetch)
    }

    /// Per-day totals for the month containing `date`.
    pub fn month_summary(&mut self, date: NaiveDate) -> Result<Vec<MonthDay>> {
        let days = dates::days_since_epoch(date);
        let body = self.call("food_entries.get_month", &[("date", days.to_string())])?;
        match body.get("month").and_then(|m| m.get("day")) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(day) => serde_json::from_value::<OneOrMany<MonthDay>>(day.clone())
                .map(OneOrMany::into_vec)
                .map_err(|e| Error::Decode(e.to_string())),
        }
    }
}

/// Parse a 200 body, turning an `error` object into [`Error::Remote`].
fn parse_envelope(body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::Decode(format!("invalid JSON: {e}")))?;
    let Some(error) = value.get("error") else {
        return Ok(value);
    };
    let code = match error.get("code") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(Error::Remote {
        kind: RemoteErrorKind::from_code(code),
        code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::auth::tests::{Approve, FakeTransport, credentials, handshake_remote, param};
    use crate::auth::{API_URL, REQUEST_TOKEN_URL};
    use crate::tokens::TokenStore;
    use crate::transport::HttpResponse;

    fn client(dir: &tempfile::TempDir, transport: Arc<FakeTransport>) -> ApiClient {
        let store = TokenStore::new(dir.path().join("tokens.json"));
        store.save(&TokenPair::new("old", "old-secret")).unwrap();
        let auth = AuthFlow::new(credentials(), store, transport.clone(), Box::new(Approve));
        ApiClient::new(auth, transport)
    }

    fn entries_body(date_int: i64) -> String {
        json!({
            "food_entries": {
                "food_entry": [
                    {"food_entry_id": "1", "date_int": date_int.to_string(), "calories": "100",
                     "carbohydrate": "1", "fat": "1", "protein": "1"},
                    {"food_entry_id": "2", "date_int": date_int.to_string(), "calories": "200",
                     "carbohydrate": "1", "fat": "1", "protein": "1"}
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn test_call_signs_request() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|_, query| {
            assert_eq!(param(query, "method"), Some("profile.get"));
            assert_eq!(param(query, "format"), Some("json"));
            assert_eq!(param(query, "oauth_token"), Some("old"));
            assert_eq!(param(query, "oauth_signature_method"), Some("HMAC-SHA1"));
            assert_eq!(param(query, "oauth_version"), Some("1.0"));

            let unsigned: Params = query
                .iter()
                .filter(|(k, _)| k != "oauth_signature")
                .cloned()
                .collect();
            let expected = oauth::sign("GET", API_URL, &unsigned, "cs", Some("old-secret")).unwrap();
            assert_eq!(param(query, "oauth_signature"), Some(expected.as_str()));
            Ok(HttpResponse::new(200, "{\"ok\": true}"))
        });
        let mut api = client(&dir, transport);
        assert_eq!(api.call("profile.get", &[]).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_token_rejection_refreshes_once() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|url, query| {
            if let Some(response) = handshake_remote(url, query) {
                return response;
            }
            match param(query, "oauth_token") {
                Some("old") => Ok(HttpResponse::new(401, "Invalid or expired Token")),
                _ => Ok(HttpResponse::new(200, "{\"profile\": null}")),
            }
        });
        let mut api = client(&dir, transport.clone());

        let body = api.call("profile.get", &[]).unwrap();
        assert_eq!(body, json!({"profile": null}));
        assert_eq!(transport.calls_to(API_URL), 2);
        assert_eq!(transport.calls_to(REQUEST_TOKEN_URL), 1);
        assert_eq!(
            api.auth_mut().store().load(),
            Some(TokenPair::new("access", "access-secret"))
        );
    }

    #[test]
    fn test_token_rejection_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|url, query| {
            handshake_remote(url, query)
                .unwrap_or_else(|| Ok(HttpResponse::new(401, "token rejected")))
        });
        let mut api = client(&dir, transport.clone());

        let err = api.call("profile.get", &[]).unwrap_err();
        assert!(matches!(err, Error::Api { status: 401, .. }));
        assert_eq!(transport.calls_to(API_URL), 3);
    }

    #[test]
    fn test_non_token_failure_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|_, _| Ok(HttpResponse::new(500, "internal error")));
        let mut api = client(&dir, transport.clone());

        let err = api.call("profile.get", &[]).unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, ref body } if body == "internal error"));
        assert_eq!(transport.calls_to(API_URL), 1);
    }

    #[test]
    fn test_network_failures_retried() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|_, _| Err(TransportError::Timeout));
        let mut api = client(&dir, transport.clone()).with_max_retries(1);

        assert!(matches!(api.call("profile.get", &[]), Err(Error::Network(_))));
        assert_eq!(transport.calls_to(API_URL), 2);
    }

    #[test]
    fn test_network_failure_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let transport = FakeTransport::new(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportError::Connect("refused".to_string()))
            } else {
                Ok(HttpResponse::new(200, "{}"))
            }
        });
        let mut api = client(&dir, transport);
        assert_eq!(api.call("profile.get", &[]).unwrap(), json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_envelope_errors() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|_, _| {
            Ok(HttpResponse::new(
                200,
                "{\"error\": {\"code\": 106, \"message\": \"Invalid ID\"}}",
            ))
        });
        let mut api = client(&dir, transport.clone());

        let err = api.call("food_entries.get.v2", &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Remote {
                kind: RemoteErrorKind::Parameter,
                code: 106,
                ..
            }
        ));
        assert_eq!(transport.calls_to(API_URL), 1);
    }

    #[test]
    fn test_auth_envelope_error_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|url, query| {
            if let Some(response) = handshake_remote(url, query) {
                return response;
            }
            match param(query, "oauth_token") {
                Some("old") => Ok(HttpResponse::new(
                    200,
                    "{\"error\": {\"code\": \"9\", \"message\": \"Invalid access token\"}}",
                )),
                _ => Ok(HttpResponse::new(200, "{}")),
            }
        });
        let mut api = client(&dir, transport.clone());

        assert_eq!(api.call("profile.get", &[]).unwrap(), json!({}));
        assert_eq!(transport.calls_to(REQUEST_TOKEN_URL), 1);
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|_, _| Ok(HttpResponse::new(200, "<html>")));
        let mut api = client(&dir, transport);
        assert!(matches!(api.call("profile.get", &[]), Err(Error::Decode(_))));
    }

    #[test]
    fn test_food_entries_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|_, query| {
            let body = match param(query, "date") {
                Some("20185") => entries_body(20185),
                Some("20186") => json!({"food_entries": {"food_entry": {"food_entry_id": "9"}}})
                    .to_string(),
                _ => json!({"food_entries": null}).to_string(),
            };
            Ok(HttpResponse::new(200, body))
        });
        let mut api = client(&dir, transport);
        let day = |d| NaiveDate::from_ymd_opt(2025, 4, d).unwrap();

        assert_eq!(api.food_entries_for_day(day(7)).unwrap().len(), 2);
        assert_eq!(api.food_entries_for_day(day(8)).unwrap().len(), 1);
        assert!(api.food_entries_for_day(day(9)).unwrap().is_empty());
    }

    #[test]
    fn test_range_skips_failing_day() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|_, query| match param(query, "date") {
            Some("20186") => Ok(HttpResponse::new(500, "backend unavailable")),
            Some(d) => Ok(HttpResponse::new(200, entries_body(d.parse().unwrap()))),
            None => panic!("no date"),
        });
        let mut api = client(&dir, transport);
        let start = NaiveDate::from_ymd_opt(2025, 4, 7).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();

        let fetch = api.food_entries_range(start, end).unwrap();
        let fetched: Vec<_> = fetch.days.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(fetched, vec!["2025-04-07", "2025-04-09"]);
        assert_eq!(fetch.skipped.len(), 1);
        assert_eq!(fetch.skipped[0].date.to_string(), "2025-04-08");
        assert_eq!(fetch.entries().len(), 4);
    }

    #[test]
    fn test_range_start_after_end_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|url, _| panic!("unexpected call to {url}"));
        let mut api = client(&dir, transport);
        let start = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 4, 7).unwrap();

        assert_eq!(api.food_entries_range(start, end).unwrap(), RangeFetch::default());
    }

    #[test]
    fn test_range_aborts_on_failed_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|url, _| {
            if url == REQUEST_TOKEN_URL {
                return Ok(HttpResponse::new(401, "invalid consumer"));
            }
            Ok(HttpResponse::new(401, "token expired"))
        });
        let mut api = client(&dir, transport);
        let start = NaiveDate::from_ymd_opt(2025, 4, 7).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();

        assert!(matches!(
            api.food_entries_range(start, end),
            Err(Error::AuthFlow(_))
        ));
    }

    #[test]
    fn test_profile_and_month() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(|_, query| {
            let body = match param(query, "method") {
                Some("profile.get") => json!({"profile": {
                    "goal_weight_kg": "70", "height_cm": "180", "height_measure": "Cm",
                    "last_weight_kg": "74.2", "weight_measure": "Kg"
                }}),
                Some("food_entries.get_month") => {
                    assert_eq!(param(query, "date"), Some("20185"));
                    json!({"month": {"day": {"date_int": "20185", "calories": "1800",
                        "carbohydrate": "200", "protein": "90", "fat": "60"}}})
                }
                other => panic!("unexpected method {other:?}"),
            };
            Ok(HttpResponse::new(200, body.to_string()))
        });
        let mut api = client(&dir, transport);

        let profile = api.profile().unwrap();
        assert!((profile.last_weight_kg - 74.2).abs() < f64::EPSILON);

        let month = api
            .month_summary(NaiveDate::from_ymd_opt(2025, 4, 7).unwrap())
            .unwrap();
        assert_eq!(month.len(), 1);
        assert!((month[0].calories - 1800.0).abs() < f64::EPSILON);
    }
}
