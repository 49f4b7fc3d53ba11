mod record;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Record)]
// ============================================================================

/// Derive macro for the `Record` trait.
///
/// The collection name defaults to the snake_case struct name plus `s` and can
/// be set with `#[record(collection = "...")]`. The id field is the one marked
/// `#[record(id)]`, or the field named `id`. It must be a `RecordId` (`u64`).
///
/// # Example
/// ```ignore
/// #[derive(Clone, PartialEq, Serialize, Deserialize, Record)]
/// #[record(collection = "polls")]
/// pub struct Poll {
///     #[record(id)]
///     pub poll_id: u64,
///     pub question: String,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record(input)
}
