use super::{Tag, TagType};
use std::fmt::Display;

/// Loosely typed view of a tag, used for display and string metadata.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    Empty,
    String(String),
    Number(f64),
    Array(Vec<f64>),
    Undefined,
}

impl Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::Empty => write!(f, ""),
            TagValue::String(s) => write!(f, "{}", s.replace('\n', "\\n")),
            TagValue::Number(v) => write!(f, "{v}"),
            TagValue::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            TagValue::Undefined => write!(f, "Undefined"),
        }
    }
}

impl From<&Tag> for TagValue {
    fn from(tag: &Tag) -> TagValue {
        if tag.data.is_empty() {
            return TagValue::Empty;
        }
        match tag.datatype {
            TagType::Ascii => tag
                .as_string()
                .map(TagValue::String)
                .unwrap_or(TagValue::Undefined),
            TagType::Undefined | TagType::Unknown => TagValue::Undefined,
            _ => match tag.values::<f64>() {
                Some(values) if values.len() == 1 => TagValue::Number(values[0]),
                Some(values) => TagValue::Array(values),
                None => TagValue::Undefined,
            },
        }
    }
}
