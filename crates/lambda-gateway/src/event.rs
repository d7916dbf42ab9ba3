//! Translation of inbound HTTP requests into proxy events.

use axum::http::{HeaderMap, Method, Uri};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Resource template of the catch-all proxy route.
pub const PROXY_RESOURCE: &str = "/{proxy+}";

/// Path parameters of the catch-all route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathParameters {
    /// The request path without its leading slash.
    pub proxy: String,
}

/// The event handed to the function for one HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEvent {
    /// Always [`PROXY_RESOURCE`].
    pub resource: String,
    /// Request path.
    pub path: String,
    /// Path parameters.
    pub path_parameters: PathParameters,
    /// HTTP method.
    pub http_method: String,
    /// Query parameters, `None` (serialized as `null`) when there are none.
    pub query_string_parameters: Option<BTreeMap<String, String>>,
    /// Lower-cased headers. Repeated headers are joined with `", "`.
    pub headers: HashMap<String, String>,
    /// The request body decoded as UTF-8.
    pub body: String,
    /// Always `false`; bodies are passed as text.
    pub is_base64_encoded: bool,
}

impl ProxyEvent {
    /// Builds the event for a fully buffered request.
    ///
    /// # Examples
    ///
    /// ```
    /// use axum::http::{HeaderMap, Method, Uri};
    /// use lambda_gateway::ProxyEvent;
    ///
    /// let uri: Uri = "/foo/bar?x=1".parse().unwrap();
    /// let event = ProxyEvent::from_request(&Method::GET, &uri, &HeaderMap::new(), b"");
    /// assert_eq!(event.path_parameters.proxy, "foo/bar");
    /// ```
    pub fn from_request(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Self {
        let path = uri.path().to_string();
        let proxy = path.strip_prefix('/').unwrap_or(&path).to_string();

        Self {
            resource: PROXY_RESOURCE.to_string(),
            path,
            path_parameters: PathParameters { proxy },
            http_method: method.as_str().to_string(),
            query_string_parameters: query_parameters(uri.query()),
            headers: header_map(headers),
            body: String::from_utf8_lossy(body).into_owned(),
            is_base64_encoded: false,
        }
    }

    /// Serializes the event to the JSON handed to the function.
    pub fn to_json(&self) -> String {
        // A struct of strings and maps always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parses the query string. The last value wins for repeated keys.
fn query_parameters(query: Option<&str>) -> Option<BTreeMap<String, String>> {
    let params: BTreeMap<String, String> = url::form_urlencoded::parse(query?.as_bytes())
        .into_owned()
        .collect();

    if params.is_empty() { None } else { Some(params) }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();

    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }

    map
}
