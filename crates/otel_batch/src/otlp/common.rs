//! Conversions from the engine's data model to OTLP protobuf messages.

use crate::resource::{AttributeValue, Resource};
use crate::scope::InstrumentationScope;
use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, ArrayValue, InstrumentationScope as ProtoScope, KeyValue,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use std::time::{SystemTime, UNIX_EPOCH};

/// Exact unix-epoch nanoseconds; pre-epoch times clamp to zero.
pub(crate) fn to_unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_nanos() as u64)
}

pub(crate) fn to_any_value(value: &AttributeValue) -> AnyValue {
    let value = match value {
        AttributeValue::Str(v) => any_value::Value::StringValue(v.clone()),
        AttributeValue::Bool(v) => any_value::Value::BoolValue(*v),
        AttributeValue::F64(v) => any_value::Value::DoubleValue(*v),
        AttributeValue::I64(v) => any_value::Value::IntValue(*v),
        AttributeValue::StrArray(values) => array_of(
            values
                .iter()
                .map(|v| any_value::Value::StringValue(v.clone())),
        ),
        AttributeValue::BoolArray(values) => {
            array_of(values.iter().map(|v| any_value::Value::BoolValue(*v)))
        }
        AttributeValue::F64Array(values) => {
            array_of(values.iter().map(|v| any_value::Value::DoubleValue(*v)))
        }
        AttributeValue::I64Array(values) => {
            array_of(values.iter().map(|v| any_value::Value::IntValue(*v)))
        }
    };

    AnyValue { value: Some(value) }
}

fn array_of(values: impl Iterator<Item = any_value::Value>) -> any_value::Value {
    any_value::Value::ArrayValue(ArrayValue {
        values: values
            .map(|value| AnyValue { value: Some(value) })
            .collect(),
    })
}

pub(crate) fn to_key_values(attributes: &[(String, AttributeValue)]) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.clone(),
            value: Some(to_any_value(value)),
        })
        .collect()
}

pub(crate) fn to_proto_resource(resource: &Resource) -> ProtoResource {
    ProtoResource {
        attributes: to_key_values(resource.attributes()),
        ..Default::default()
    }
}

pub(crate) fn to_proto_scope(scope: &InstrumentationScope) -> ProtoScope {
    ProtoScope {
        name: scope.name().to_string(),
        version: scope.version().unwrap_or_default().to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn nanosecond_conversion_is_exact() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        assert_eq!(to_unix_nanos(time), 1_700_000_000_123_456_789);
    }

    #[test]
    fn pre_epoch_clamps_to_zero() {
        let time = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(to_unix_nanos(time), 0);
    }

    #[test]
    fn arrays_become_array_values() {
        let value = to_any_value(&AttributeValue::I64Array(vec![1, 2]));
        match value.value {
            Some(any_value::Value::ArrayValue(array)) => assert_eq!(array.values.len(), 2),
            other => panic!("expected array value, got {other:?}"),
        }
    }
}
