//! Managed values
//!
//! Records are heap objects like classes; [`Value::copy_record`] gives them
//! value semantics when they are stored.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use stitch_bytecode::MethodRef;

use crate::error::{RuntimeError, RuntimeResult};
use crate::interp::marshal::Marshaller;
use crate::memory::Scalar;

/// Shared managed object
pub type ObjRef = Rc<RefCell<Object>>;

/// A managed object: its class and instance fields
#[derive(Debug, Clone)]
pub struct Object {
    /// Class (or record) name
    pub class: String,
    /// Whether the object is a record
    pub is_record: bool,
    /// Instance fields by name
    pub fields: FxHashMap<String, Value>,
}

impl Object {
    /// Field value, `Null` when unset
    pub fn get(&self, name: &str) -> Value {
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }
}

/// A value on the evaluation stack, in a local or in a field
#[derive(Clone, Default)]
pub enum Value {
    /// Null reference
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Any integer
    Int(i64),
    /// Any float
    Float(f64),
    /// Native pointer
    Ptr(u64),
    /// Managed string
    Str(Rc<str>),
    /// Class or record instance
    Object(ObjRef),
    /// Managed list (arrays, sets, fixed arrays)
    List(Rc<RefCell<Vec<Value>>>),
    /// Managed map
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    /// Opaque native bytes
    Bytes(Rc<Vec<u8>>),
    /// By-reference argument cell
    Ref(Rc<RefCell<Value>>),
    /// Function pointer
    Function(MethodRef),
    /// Container marshaller
    Marshaller(Rc<Marshaller>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Ptr(p) => write!(f, "ptr({:#x})", p),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Object(o) => write!(f, "object({})", o.borrow().class),
            Self::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Self::Map(entries) => f
                .debug_map()
                .entries(entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())))
                .finish(),
            Self::Bytes(b) => write!(f, "bytes({})", b.len()),
            Self::Ref(cell) => write!(f, "ref({:?})", cell.borrow()),
            Self::Function(m) => write!(f, "fn {}::{}", m.owner, m.name),
            Self::Marshaller(m) => write!(f, "marshaller({})", m.kind_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, Self::Ptr(0)) | (Self::Ptr(0), Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Ptr(a), Self::Ptr(b)) => a == b,
            (Self::Ptr(a), Self::Int(b)) | (Self::Int(b), Self::Ptr(a)) => *a as i64 == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.is_record && b.is_record && a.class == b.class && a.fields == b.fields
            }
            (Self::List(a), Self::List(b)) => *a.borrow() == *b.borrow(),
            (Self::Map(a), Self::Map(b)) => *a.borrow() == *b.borrow(),
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a == b,
            (Self::Marshaller(a), Self::Marshaller(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// String value
    pub fn string(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    /// List value
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    /// Map value
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Self::Map(Rc::new(RefCell::new(entries)))
    }

    /// Fresh object value
    pub fn object(object: Object) -> Self {
        Self::Object(Rc::new(RefCell::new(object)))
    }

    /// Branch condition
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Ptr(p) => *p != 0,
            _ => true,
        }
    }

    /// Integer operand
    pub fn as_i64(&self) -> RuntimeResult<i64> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Ptr(p) => Ok(*p as i64),
            Self::Null => Ok(0),
            other => Err(RuntimeError::mismatch("integer", other)),
        }
    }

    /// Float operand
    pub fn as_f64(&self) -> RuntimeResult<f64> {
        match self {
            Self::Float(f) => Ok(*f),
            Self::Int(i) => Ok(*i as f64),
            other => Err(RuntimeError::mismatch("float", other)),
        }
    }

    /// Boolean operand
    pub fn as_bool(&self) -> RuntimeResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(i) => Ok(*i != 0),
            other => Err(RuntimeError::mismatch("bool", other)),
        }
    }

    /// Pointer operand; null and integers are accepted
    pub fn as_ptr(&self) -> RuntimeResult<u64> {
        match self {
            Self::Ptr(p) => Ok(*p),
            Self::Null => Ok(0),
            Self::Int(i) => Ok(*i as u64),
            other => Err(RuntimeError::mismatch("pointer", other)),
        }
    }

    /// String operand
    pub fn as_str(&self) -> RuntimeResult<&str> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(RuntimeError::mismatch("string", other)),
        }
    }

    /// Object operand
    pub fn as_object(&self) -> RuntimeResult<&ObjRef> {
        match self {
            Self::Object(o) => Ok(o),
            other => Err(RuntimeError::mismatch("object", other)),
        }
    }

    /// Value as a native primitive
    pub fn to_scalar(&self) -> RuntimeResult<Scalar> {
        Ok(match self {
            Self::Bool(b) => Scalar::Bool(*b),
            Self::Int(i) => Scalar::Int(*i),
            Self::Float(f) => Scalar::Float(*f),
            Self::Ptr(p) => Scalar::Ptr(*p),
            Self::Null => Scalar::Ptr(0),
            other => return Err(RuntimeError::mismatch("primitive", other)),
        })
    }

    /// Managed value of a native primitive
    pub fn from_scalar(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => Self::Bool(b),
            Scalar::Int(i) => Self::Int(i),
            Scalar::Float(f) => Self::Float(f),
            Scalar::Ptr(p) => Self::Ptr(p),
        }
    }

    /// Deep copy of a record; every other value is returned as is
    pub fn copy_record(&self) -> Self {
        match self {
            Self::Object(o) if o.borrow().is_record => {
                let source = o.borrow();
                let fields = source
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.copy_record()))
                    .collect();
                Self::object(Object {
                    class: source.class.clone(),
                    is_record: true,
                    fields,
                })
            }
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: i64) -> Value {
        let mut fields = FxHashMap::default();
        fields.insert("x".to_string(), Value::Int(x));
        Value::object(Object {
            class: "P".into(),
            is_record: true,
            fields,
        })
    }

    #[test]
    fn test_records_compare_by_value() {
        assert_eq!(point(1), point(1));
        assert_ne!(point(1), point(2));
    }

    #[test]
    fn test_copy_record_detaches() {
        let a = point(1);
        let b = a.copy_record();
        if let Value::Object(o) = &b {
            o.borrow_mut().fields.insert("x".into(), Value::Int(5));
        }
        assert_eq!(a, point(1));
        assert_eq!(b, point(5));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Ptr(0).is_truthy());
        assert!(Value::Ptr(16).is_truthy());
        assert!(Value::string("").is_truthy());
        assert_eq!(Value::Null, Value::Ptr(0));
    }
}
