//! Native values held by the local tier in raw mode.
//!
//! Raw mode skips the codec: the local tier keeps the value itself. Common
//! primitives get their own variant so they can be read back with light
//! coercion (a string into `Vec<u8>`, an `i64` into `i32`, ...); anything
//! else is boxed and must be read back as exactly the same type.

use std::any::{type_name, Any};
use std::sync::Arc;

use bytes::Bytes;

use crate::cache::error::CacheError;

#[derive(Debug, Clone)]
pub enum RawValue {
    Str(String),
    Bytes(Bytes),
    Bool(bool),
    Int(i64),
    Float(f64),
    Any(Arc<dyn Any + Send + Sync>),
}

impl RawValue {
    /// Capture `value`, picking a primitive variant when one fits.
    pub fn from_value<T: Any + Clone + Send + Sync>(value: &T) -> Self {
        let any = value as &dyn Any;
        if let Some(s) = any.downcast_ref::<String>() {
            return RawValue::Str(s.clone());
        }
        if let Some(&s) = any.downcast_ref::<&'static str>() {
            return RawValue::Str(s.to_string());
        }
        if let Some(b) = any.downcast_ref::<Bytes>() {
            return RawValue::Bytes(b.clone());
        }
        if let Some(b) = any.downcast_ref::<Vec<u8>>() {
            return RawValue::Bytes(Bytes::copy_from_slice(b));
        }
        if let Some(&b) = any.downcast_ref::<bool>() {
            return RawValue::Bool(b);
        }
        if let Some(&i) = any.downcast_ref::<i64>() {
            return RawValue::Int(i);
        }
        if let Some(&i) = any.downcast_ref::<i32>() {
            return RawValue::Int(i64::from(i));
        }
        if let Some(&f) = any.downcast_ref::<f64>() {
            return RawValue::Float(f);
        }
        RawValue::Any(Arc::new(value.clone()))
    }

    /// Short name of the held kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Str(_) => "string",
            RawValue::Bytes(_) => "bytes",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "int",
            RawValue::Float(_) => "float",
            RawValue::Any(_) => "boxed value",
        }
    }

    /// Read the value back as `T`.
    ///
    /// Fails with [`CacheError::InvalidOutput`] when the held kind cannot be
    /// assigned to `T`.
    pub fn extract<T: Any + Clone>(&self) -> Result<T, CacheError> {
        let mut out: Option<T> = None;
        let slot = &mut out as &mut dyn Any;

        match self {
            RawValue::Str(s) => {
                if let Some(dest) = slot.downcast_mut::<Option<String>>() {
                    *dest = Some(s.clone());
                } else if let Some(dest) = slot.downcast_mut::<Option<Vec<u8>>>() {
                    *dest = Some(s.clone().into_bytes());
                } else if let Some(dest) = slot.downcast_mut::<Option<Bytes>>() {
                    *dest = Some(Bytes::copy_from_slice(s.as_bytes()));
                }
            }
            RawValue::Bytes(b) => {
                if let Some(dest) = slot.downcast_mut::<Option<Bytes>>() {
                    *dest = Some(b.clone());
                } else if let Some(dest) = slot.downcast_mut::<Option<Vec<u8>>>() {
                    *dest = Some(b.to_vec());
                } else if let Some(dest) = slot.downcast_mut::<Option<String>>() {
                    *dest = String::from_utf8(b.to_vec()).ok();
                }
            }
            RawValue::Bool(b) => {
                if let Some(dest) = slot.downcast_mut::<Option<bool>>() {
                    *dest = Some(*b);
                }
            }
            RawValue::Int(i) => {
                if let Some(dest) = slot.downcast_mut::<Option<i64>>() {
                    *dest = Some(*i);
                } else if let Some(dest) = slot.downcast_mut::<Option<i32>>() {
                    *dest = i32::try_from(*i).ok();
                }
            }
            RawValue::Float(f) => {
                if let Some(dest) = slot.downcast_mut::<Option<f64>>() {
                    *dest = Some(*f);
                }
            }
            RawValue::Any(boxed) => {
                out = boxed.downcast_ref::<T>().cloned();
            }
        }

        out.ok_or(CacheError::InvalidOutput {
            expected: type_name::<T>(),
            found: self.kind(),
        })
    }
}
