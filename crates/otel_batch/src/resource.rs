use serde::Serialize;

/// An attribute value in the shape the wire protocol can carry: strings,
/// booleans, 64-bit floats, 64-bit integers, and homogeneous arrays thereof.
///
/// Narrower numeric types are widened by the `From` conversions, so an
/// unrepresentable attribute cannot be constructed: sanitation happens at the
/// type level instead of at export time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributeValue {
    Str(String),
    Bool(bool),
    F64(f64),
    I64(i64),
    StrArray(Vec<String>),
    BoolArray(Vec<bool>),
    F64Array(Vec<f64>),
    I64Array(Vec<i64>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        Self::F64(f64::from(value))
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::I64(i64::from(value))
    }
}

impl From<i16> for AttributeValue {
    fn from(value: i16) -> Self {
        Self::I64(i64::from(value))
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::I64(i64::from(value))
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::StrArray(value)
    }
}

impl From<Vec<bool>> for AttributeValue {
    fn from(value: Vec<bool>) -> Self {
        Self::BoolArray(value)
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(value: Vec<f64>) -> Self {
        Self::F64Array(value)
    }
}

impl From<Vec<f32>> for AttributeValue {
    fn from(value: Vec<f32>) -> Self {
        Self::F64Array(value.into_iter().map(f64::from).collect())
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(value: Vec<i64>) -> Self {
        Self::I64Array(value)
    }
}

impl From<Vec<i32>> for AttributeValue {
    fn from(value: Vec<i32>) -> Self {
        Self::I64Array(value.into_iter().map(i64::from).collect())
    }
}

/// A named attribute list.
pub type Attributes = Vec<(String, AttributeValue)>;

/// Immutable attribute set identifying the emitting process or service.
///
/// One `Resource` (behind `Arc`) is shared by every batch a processor
/// produces; it never changes for the processor's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resource {
    attributes: Attributes,
}

impl Resource {
    pub fn new(attributes: impl IntoIterator<Item = (String, AttributeValue)>) -> Self {
        Self {
            attributes: attributes.into_iter().collect(),
        }
    }

    /// A resource with no attributes.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn attributes(&self) -> &[(String, AttributeValue)] {
        &self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_numerics_are_widened() {
        assert_eq!(AttributeValue::from(7i32), AttributeValue::I64(7));
        assert_eq!(AttributeValue::from(7i16), AttributeValue::I64(7));
        assert_eq!(AttributeValue::from(1.5f32), AttributeValue::F64(1.5));
        assert_eq!(
            AttributeValue::from(vec![1i32, 2, 3]),
            AttributeValue::I64Array(vec![1, 2, 3])
        );
    }

    #[test]
    fn resource_keeps_attribute_order() {
        let resource = Resource::new([
            ("service.name".to_string(), "api".into()),
            ("service.instance.id".to_string(), 42i64.into()),
        ]);
        assert_eq!(resource.attributes().len(), 2);
        assert_eq!(resource.attributes()[0].0, "service.name");
    }
}
