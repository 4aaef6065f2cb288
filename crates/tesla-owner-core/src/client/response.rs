use serde::Deserialize;

/// Envelope for single-object endpoints: `{"response": {...}}`.
#[derive(Deserialize, Debug)]
pub(crate) struct OneResponse<T> {
    pub response: T,
}

/// Envelope for list endpoints: `{"response": [...], "count": n}`.
#[derive(Deserialize, Debug)]
pub(crate) struct ListResponse<T> {
    pub response: Vec<T>,
    #[serde(default)]
    pub count: Option<usize>,
}
