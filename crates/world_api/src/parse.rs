use crate::snapshot::{ShapeError, WorldSnapshot};
use serde_json::Value;
use thiserror::Error;

/// Top-level keys every world document must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["width", "height", "grid", "customers", "cars"];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("world document is not valid JSON of the expected shape")]
    Malformed(#[from] serde_json::Error),
    #[error("world document has no `{0}` field")]
    MissingField(&'static str),
    #[error("world document is inconsistent")]
    Invalid(#[from] ShapeError),
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::Malformed(_) => "malformed",
            ParseError::MissingField(_) => "missing_field",
            ParseError::Invalid(ShapeError::DimensionsChanged { .. }) => "dimensions_changed",
            ParseError::Invalid(_) => "invalid",
        }
    }
}

/// Parses and validates one response body of the world endpoint.
///
/// Once a game is over the server answers with a bare message object, which
/// surfaces here as [`ParseError::MissingField`].
pub fn parse_world(body: &[u8]) -> Result<WorldSnapshot, ParseError> {
    let value: Value = serde_json::from_slice(body)?;

    if let Some(object) = value.as_object() {
        if let Some(missing) = REQUIRED_FIELDS
            .iter()
            .find(|field| object.get(**field).map_or(true, Value::is_null))
        {
            return Err(ParseError::MissingField(*missing));
        }
    }

    let snapshot: WorldSnapshot = serde_json::from_value(value)?;
    snapshot.validate()?;
    Ok(snapshot)
}
