//! Response objects returned from Google Ads, and the decoder that flattens them into rows.
//!
//! The query endpoint answers in one of two encodings:
//!
//! * a single JSON document: a `{"results": [...]}` batch, an array of batches or rows, or a
//!   bare resource object standing in for a one-row result;
//! * a stream of JSON chunks, one per line (or several concatenated on one line), each a batch
//!   or a bare resource.
//!
//! Both end up as a flat `Vec<ResultRow>` in provider order.

use crate::client_error::ClientError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

/// One result row: requested resource groups (`campaign`, `metrics`, ...) mapped to their
/// values. The shape depends entirely on the query.
pub type ResultRow = Map<String, Value>;

/// Alternate spellings of a resource key, paired with the canonical (REST) spelling.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("ad_group", "adGroup"),
    ("ad_group_ad", "adGroupAd"),
    ("ad_group_criterion", "adGroupCriterion"),
    ("campaign_budget", "campaignBudget"),
    ("customer_client", "customerClient"),
];

/// Top-level keys that mark a bare object as a result row.
const RESOURCE_KEYS: &[&str] = &[
    "campaign",
    "campaignBudget",
    "adGroup",
    "adGroupAd",
    "adGroupCriterion",
    "customer",
    "customerClient",
    "metrics",
];

/// A `:search` page or one `:searchStream` batch. Other envelope fields (`fieldMask`,
/// `requestId`, `nextPageToken`) are ignored.
#[derive(Debug, Deserialize)]
pub struct SearchBatch {
    pub results: Vec<Value>,
}

// The order of the variants matter here, because `serde` will try to match each variant,
// starting from the top.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Batch(SearchBatch),
    Rows(Vec<Value>),
    Resource(ResultRow),
}

impl ResponseBody {
    /// Flatten into result rows.
    pub fn into_rows(self) -> Vec<ResultRow> {
        match self {
            ResponseBody::Batch(batch) => batch
                .results
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect(),
            ResponseBody::Rows(items) => items.into_iter().flat_map(normalize_chunk).collect(),
            ResponseBody::Resource(resource) => normalize_resource(resource),
        }
    }
}

/// Turn one decoded chunk into zero, one or many rows.
///
/// Chunks with no recognized shape (metadata, heartbeats) produce no rows.
pub fn normalize_chunk(chunk: Value) -> Vec<ResultRow> {
    match serde_json::from_value::<ResponseBody>(chunk) {
        Ok(body) => body.into_rows(),
        Err(_) => Vec::new(),
    }
}

/// Reconcile alias keys on a bare object, then keep it as a row if it carries a resource.
fn normalize_resource(mut resource: ResultRow) -> Vec<ResultRow> {
    reconcile_aliases(&mut resource);

    if RESOURCE_KEYS.iter().any(|key| resource.contains_key(*key)) {
        vec![resource]
    } else {
        Vec::new()
    }
}

/// Copy each alternate spelling into its canonical key, unless the canonical key is set.
pub fn reconcile_aliases(resource: &mut ResultRow) {
    for (alias, canonical) in FIELD_ALIASES {
        if resource.contains_key(*canonical) {
            continue;
        }

        if let Some(value) = resource.get(*alias).cloned() {
            resource.insert(canonical.to_string(), value);
        }
    }
}

/// How a response body was read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseEncoding {
    SingleDocument,
    Stream,
}

/// Rows decoded from a response body.
#[derive(Debug)]
pub struct DecodedResponse {
    pub rows: Vec<ResultRow>,
    pub encoding: ResponseEncoding,
    /// Stream chunks that failed to parse, or parsed only as a scalar, and were dropped.
    pub skipped_chunks: usize,
}

/// Decode a query response body in either encoding.
///
/// The body is first read as a single JSON document. If that fails it is read line by line
/// as a stream; unparseable and scalar chunks are logged and skipped. A body in which no
/// object or array parses is `MalformedResponse`.
pub fn decode_body(body: &str) -> Result<DecodedResponse, ClientError> {
    let body = body.trim();

    if body.is_empty() {
        return Err(ClientError::MalformedResponse(String::from("empty response body")));
    }

    match serde_json::from_str::<Value>(body) {
        Ok(document) => decode_document(document),
        Err(error) => {
            debug!(error = %error, "response is not a single JSON document, reading as stream");
            decode_stream(body)
        }
    }
}

fn decode_document(document: Value) -> Result<DecodedResponse, ClientError> {
    let body = serde_json::from_value::<ResponseBody>(document).map_err(|error| {
        ClientError::MalformedResponse(format!("unexpected document shape: {}", error))
    })?;

    Ok(DecodedResponse {
        rows: body.into_rows(),
        encoding: ResponseEncoding::SingleDocument,
        skipped_chunks: 0,
    })
}

fn decode_stream(body: &str) -> Result<DecodedResponse, ClientError> {
    let mut rows = Vec::new();
    let mut parsed_chunks = 0;
    let mut skipped_chunks = 0;

    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut chunks = serde_json::Deserializer::from_str(line).into_iter::<Value>();

        while let Some(chunk) = chunks.next() {
            match chunk {
                Ok(chunk @ Value::Object(_)) | Ok(chunk @ Value::Array(_)) => {
                    parsed_chunks += 1;
                    rows.extend(normalize_chunk(chunk));
                }
                Ok(scalar) => {
                    // fragments of a truncated document or a non-JSON page parse as scalars
                    skipped_chunks += 1;
                    warn!(
                        line = index + 1,
                        offset = chunks.byte_offset(),
                        chunk = %scalar,
                        "skipping scalar stream chunk"
                    );
                }
                Err(error) => {
                    // the rest of the line can't be resynchronized
                    skipped_chunks += 1;
                    warn!(
                        line = index + 1,
                        offset = chunks.byte_offset(),
                        error = %error,
                        "skipping unparseable stream chunk"
                    );
                    break;
                }
            }
        }
    }

    if parsed_chunks == 0 {
        return Err(ClientError::MalformedResponse(format!(
            "none of {} stream chunk(s) could be parsed",
            skipped_chunks
        )));
    }

    Ok(DecodedResponse {
        rows,
        encoding: ResponseEncoding::Stream,
        skipped_chunks,
    })
}

/// Error envelope Google Ads sends back from a failed request. `code` is the HTTP status,
/// `status` the RPC status name, and `message` *might* have more information.
///
/// There is also a `details` field we are not capturing.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: u16,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub status: String,
}

impl ApiErrorResponse {
    /// Read the error envelope out of a raw payload. `:searchStream` wraps it in an array.
    ///
    /// The shape is checked before decoding, since a struct would also accept an array as
    /// positional fields.
    pub fn from_payload(payload: &str) -> Option<ApiErrorResponse> {
        match serde_json::from_str::<Value>(payload).ok()? {
            Value::Array(errors) => errors
                .into_iter()
                .next()
                .filter(Value::is_object)
                .and_then(|error| serde_json::from_value(error).ok()),
            error @ Value::Object(_) => serde_json::from_value(error).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.error.status, self.error.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn rows(value: Value) -> Vec<ResultRow> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| item.as_object().cloned().unwrap())
                .collect(),
            _ => panic!("expected an array of rows"),
        }
    }

    #[test]
    fn results_wrapper_is_unwrapped() {
        let chunk = json!({"results": [{"campaign": {"id": "1"}}]});

        assert_eq!(normalize_chunk(chunk), rows(json!([{"campaign": {"id": "1"}}])));
    }

    #[test]
    fn bare_resource_is_a_single_row() {
        let chunk = json!({"campaign": {"id": "1"}});

        assert_eq!(normalize_chunk(chunk), rows(json!([{"campaign": {"id": "1"}}])));
    }

    #[test]
    fn results_rows_are_kept_as_is() {
        let chunk = json!({
            "results": [{"ad_group": {"id": "5"}}, {"metrics": {"clicks": "3"}}],
            "fieldMask": "adGroup.id",
        });

        assert_eq!(
            normalize_chunk(chunk),
            rows(json!([{"ad_group": {"id": "5"}}, {"metrics": {"clicks": "3"}}]))
        );
    }

    #[test]
    fn snake_case_alias_is_copied_to_canonical_key() {
        let chunk = json!({"customer_client": {"id": "42"}});
        let normalized = normalize_chunk(chunk);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0]["customerClient"], json!({"id": "42"}));
        assert_eq!(normalized[0]["customer_client"], json!({"id": "42"}));
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let chunk = json!({"adGroup": {"id": "1"}, "ad_group": {"id": "2"}});
        let normalized = normalize_chunk(chunk);

        assert_eq!(normalized[0]["adGroup"], json!({"id": "1"}));
    }

    #[test]
    fn metadata_chunk_yields_no_rows() {
        let chunk = json!({"fieldMask": "campaign.id", "requestId": "abc"});

        assert!(normalize_chunk(chunk).is_empty());
    }

    #[test]
    fn scalar_chunk_yields_no_rows() {
        assert!(normalize_chunk(json!("heartbeat")).is_empty());
        assert!(normalize_chunk(Value::Null).is_empty());
    }

    #[test]
    fn array_of_batches_is_flattened() {
        let chunk = json!([
            {"results": [{"campaign": {"id": "1"}}]},
            {"results": [{"campaign": {"id": "2"}}], "requestId": "r"},
        ]);

        assert_eq!(
            normalize_chunk(chunk),
            rows(json!([{"campaign": {"id": "1"}}, {"campaign": {"id": "2"}}]))
        );
    }

    #[test]
    fn array_of_rows_is_flattened() {
        let body = r#"[{"campaign":{"id":"1"}},{"metrics":{"clicks":"9"}}]"#;
        let decoded = decode_body(body).unwrap();

        assert_eq!(decoded.encoding, ResponseEncoding::SingleDocument);
        assert_eq!(
            decoded.rows,
            rows(json!([{"campaign": {"id": "1"}}, {"metrics": {"clicks": "9"}}]))
        );
    }

    #[test]
    fn single_document_body() {
        let decoded = decode_body(r#"{"results":[{"campaign":{"id":"1"}}]}"#).unwrap();

        assert_eq!(decoded.encoding, ResponseEncoding::SingleDocument);
        assert_eq!(decoded.rows, rows(json!([{"campaign": {"id": "1"}}])));
        assert_eq!(decoded.skipped_chunks, 0);
    }

    #[test]
    fn unwrapped_single_resource_body() {
        let decoded = decode_body(r#"{"campaign":{"id":"1"}}"#).unwrap();

        assert_eq!(decoded.rows, rows(json!([{"campaign": {"id": "1"}}])));
    }

    #[test]
    fn both_encodings_produce_equal_rows() {
        let document = r#"{"results":[{"campaign":{"id":"1"}},{"campaign":{"id":"2"}},{"campaign":{"id":"3"}}]}"#;
        let stream = concat!(
            r#"{"results":[{"campaign":{"id":"1"}}]}"#,
            "\n",
            r#"{"results":[{"campaign":{"id":"2"}}]}"#,
            "\n",
            r#"{"campaign":{"id":"3"}}"#,
            "\n",
        );

        let from_document = decode_body(document).unwrap();
        let from_stream = decode_body(stream).unwrap();

        assert_eq!(from_document.encoding, ResponseEncoding::SingleDocument);
        assert_eq!(from_stream.encoding, ResponseEncoding::Stream);
        assert_eq!(from_document.rows, from_stream.rows);
    }

    #[test]
    fn concatenated_chunks_on_one_line() {
        let stream = r#"{"campaign":{"id":"1"}}{"campaign":{"id":"2"}}"#;
        let decoded = decode_body(stream).unwrap();

        assert_eq!(decoded.encoding, ResponseEncoding::Stream);
        assert_eq!(
            decoded.rows,
            rows(json!([{"campaign": {"id": "1"}}, {"campaign": {"id": "2"}}]))
        );
    }

    /// Counts WARN events, to check that dropped chunks are reported.
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn decode_counting_warnings(body: &str) -> (Result<DecodedResponse, ClientError>, usize) {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        let decoded = tracing::subscriber::with_default(subscriber, || decode_body(body));

        (decoded, warnings.load(Ordering::SeqCst))
    }

    #[test]
    fn malformed_chunk_is_skipped_counted_and_logged() {
        let stream = concat!(
            r#"{"campaign":{"id":"1"}}"#,
            "\n",
            r#"{"campaign":{"id":"2"}}"#,
            "\n",
            r#"{"campaign": {"id": "#,
            "\n",
            "\n",
            r#"{"results":[{"campaign":{"id":"3"}}]}"#,
            "\n",
        );
        let (decoded, warnings) = decode_counting_warnings(stream);
        let decoded = decoded.unwrap();

        assert_eq!(decoded.rows.len(), 3);
        assert_eq!(decoded.skipped_chunks, 1);
        assert_eq!(warnings, 1);
        assert_eq!(decoded.rows[2]["campaign"], json!({"id": "3"}));
    }

    #[test]
    fn unparseable_body_is_malformed() {
        match decode_body("<html>Bad Gateway</html>") {
            Err(ClientError::MalformedResponse(_)) => {}
            other => panic!("expected MalformedResponse, got {:?}", other),
        }
    }

    #[test]
    fn truncated_stream_array_is_malformed() {
        let body = "[{\n  \"results\": [\n    {\n      \"campaign\": {\n        \"id\": \"1\"\n";

        match decode_body(body) {
            Err(ClientError::MalformedResponse(_)) => {}
            other => panic!("expected MalformedResponse, got {:?}", other),
        }
    }

    #[test]
    fn multi_line_html_page_is_malformed() {
        let (decoded, warnings) = decode_counting_warnings("<html>\n502 Bad Gateway\n</html>");

        match decoded {
            Err(ClientError::MalformedResponse(_)) => {}
            other => panic!("expected MalformedResponse, got {:?}", other),
        }
        assert!(warnings >= 3);
    }

    #[test]
    fn scalar_chunks_do_not_count_as_rows() {
        let stream = concat!("\"heartbeat\"\n", r#"{"campaign":{"id":"1"}}"#, "\n", "7\n");
        let decoded = decode_body(stream).unwrap();

        assert_eq!(decoded.rows.len(), 1);
        assert_eq!(decoded.skipped_chunks, 2);
    }

    #[test]
    fn empty_body_is_malformed() {
        match decode_body("  \n ") {
            Err(ClientError::MalformedResponse(_)) => {}
            other => panic!("expected MalformedResponse, got {:?}", other),
        }
    }

    #[test]
    fn scalar_document_is_malformed() {
        match decode_body("42") {
            Err(ClientError::MalformedResponse(_)) => {}
            other => panic!("expected MalformedResponse, got {:?}", other),
        }
    }

    #[test]
    fn empty_result_set_is_zero_rows() {
        let decoded = decode_body(r#"{"fieldMask":"campaign.id","requestId":"x"}"#).unwrap();

        assert!(decoded.rows.is_empty());
    }

    #[test]
    fn api_error_from_object_payload() {
        let payload = r#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#;
        let error = ApiErrorResponse::from_payload(payload).unwrap();

        assert_eq!(error.error.code, 401);
        assert_eq!(
            error.to_string(),
            "[UNAUTHENTICATED] Request had invalid authentication credentials."
        );
    }

    #[test]
    fn api_error_from_stream_payload() {
        let payload = r#"[{"error":{"code":403,"message":"denied","status":"PERMISSION_DENIED"}}]"#;
        let error = ApiErrorResponse::from_payload(payload).unwrap();

        assert_eq!(error.to_string(), "[PERMISSION_DENIED] denied");
    }

    #[test]
    fn api_error_from_plain_text_payload() {
        assert!(ApiErrorResponse::from_payload("Unauthorized").is_none());
    }

    #[test]
    fn api_error_array_is_not_read_as_positional_fields() {
        let payload = r#"[{"error":{"code":401,"message":"expired","status":"UNAUTHENTICATED"}}]"#;
        let error = ApiErrorResponse::from_payload(payload).unwrap();

        assert_eq!(error.error.code, 401);
        assert_eq!(error.error.status, "UNAUTHENTICATED");
        assert_ne!(error.to_string(), "[] ");
    }

    #[test]
    fn api_error_rejects_other_shapes() {
        assert!(ApiErrorResponse::from_payload(r#"{"error":"invalid_grant"}"#).is_none());
        assert!(ApiErrorResponse::from_payload("[]").is_none());
        assert!(ApiErrorResponse::from_payload("[1]").is_none());
    }
}
