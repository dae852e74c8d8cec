use thiserror::Error;

/// Failures raised while turning XML bytes into a `Response` or writing one
/// back out. Deserialization failures at the *message* level (missing
/// fields, unknown tags) are not represented here — those become
/// `Request::BadMessage` per spec, not an `Err`. This type covers failures
/// too low-level to recover from: XML that doesn't parse at all, or an
/// internal bug trying to serialize a response variant that has no wire
/// form.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed XML: {0}")]
    MalformedXml(#[from] quick_xml::Error),

    #[error("malformed XML: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
