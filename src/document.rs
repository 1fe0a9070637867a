use serde::de::DeserializeOwned;
use serde::Serialize;

/// Contract an indexable type must satisfy.
///
/// The core only depends on two things from a document: a stable string
/// identifier (the primary key of the backing table) and a single derived
/// "searchable text" string that the engines tokenize and rank against.
/// Everything else about the type is opaque; the full document travels as a
/// JSON payload and individual fields are reached with JSON extraction when
/// filters reference them.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use fts_bridge::Document;
///
/// #[derive(Serialize, Deserialize)]
/// struct Article {
///     slug: String,
///     title: String,
///     body: String,
/// }
///
/// impl Document for Article {
///     fn id(&self) -> String {
///         self.slug.clone()
///     }
///
///     fn search_text(&self) -> String {
///         format!("{} {}", self.title, self.body)
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable identifier for the document. Re-`put` with the same id replaces
    /// the stored document in full; there are no partial updates.
    fn id(&self) -> String;

    /// The flattened text the full-text engines index and score against.
    fn search_text(&self) -> String;
}
