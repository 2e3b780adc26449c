//! Data references - shared value slots that wire operator outputs to inputs
//!
//! A slot is created by exactly one [`DataWriteReference`]. Any number of
//! [`DataReadReference`]s may observe it. Write access is never handed out
//! through a [`DataReferenceCollection`], so the single-writer rule holds by
//! construction. Locks are uncontended: the host executes one graph on one
//! thread and never lets two writers share a slot.
//!
//! Host writes to graph inputs must not race `execute_block`: a write that
//! lands mid-block makes `execute` wait for the writer. Update inputs between
//! blocks on the thread that runs the graph.

use std::any::Any;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parameters::{DataType, Literal};
use crate::processing::OperatorSettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataReferenceError {
    #[error("Data reference '{name}' not found")]
    NotFound { name: String },

    #[error("Data type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: DataType, found: DataType },
}

/// Value types that may live in a slot.
pub trait DataValue: Any + Send + Sync + Sized {
    const DATA_TYPE: DataType;

    /// Converts a declared default into a value. `None` when the pairing is unsupported.
    fn from_literal(literal: &Literal, settings: &OperatorSettings) -> Option<Self>;
}

impl DataValue for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    fn from_literal(literal: &Literal, _settings: &OperatorSettings) -> Option<Self> {
        match literal {
            Literal::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl DataValue for i32 {
    const DATA_TYPE: DataType = DataType::Int32;

    fn from_literal(literal: &Literal, _settings: &OperatorSettings) -> Option<Self> {
        match literal {
            Literal::Int32(v) => Some(*v),
            _ => None,
        }
    }
}

impl DataValue for f32 {
    const DATA_TYPE: DataType = DataType::Float;

    fn from_literal(literal: &Literal, _settings: &OperatorSettings) -> Option<Self> {
        match literal {
            Literal::Float(v) => Some(*v),
            Literal::Int32(v) => Some(*v as f32),
            _ => None,
        }
    }
}

impl DataValue for String {
    const DATA_TYPE: DataType = DataType::String;

    fn from_literal(literal: &Literal, _settings: &OperatorSettings) -> Option<Self> {
        match literal {
            Literal::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// One block of mono samples. Length is fixed when the buffer is created.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioBuffer(Vec<f32>);

impl AudioBuffer {
    pub fn silence(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn filled(len: usize, value: f32) -> Self {
        Self(vec![value; len])
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self(samples)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.0
    }
}

impl Deref for AudioBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl DerefMut for AudioBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.0
    }
}

impl DataValue for AudioBuffer {
    const DATA_TYPE: DataType = DataType::Audio;

    fn from_literal(literal: &Literal, settings: &OperatorSettings) -> Option<Self> {
        match literal {
            Literal::Float(v) => Some(Self::filled(settings.block_size(), *v)),
            Literal::Int32(v) => Some(Self::filled(settings.block_size(), *v as f32)),
            _ => None,
        }
    }
}

/// Read-only, shareable handle to a slot.
pub struct DataReadReference<T> {
    slot: Arc<RwLock<T>>,
}

impl<T> Clone for DataReadReference<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: DataValue> DataReadReference<T> {
    /// Never queues behind a waiting writer while another reader holds the slot,
    /// so one operator may hold guards on two fanned-out references at once.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.slot.read_recursive()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: DataValue + Copy> DataReadReference<T> {
    pub fn get(&self) -> T {
        *self.slot.read_recursive()
    }
}

impl<T: DataValue + std::fmt::Debug> std::fmt::Debug for DataReadReference<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DataReadReference").field(&*self.slot.read()).finish()
    }
}

/// The one write-capable handle to a slot. Not `Clone`.
pub struct DataWriteReference<T> {
    slot: Arc<RwLock<T>>,
}

impl<T: DataValue> DataWriteReference<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: Arc::new(RwLock::new(value)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.slot.read()
    }

    pub fn write(&mut self) -> RwLockWriteGuard<'_, T> {
        self.slot.write()
    }

    pub fn set(&mut self, value: T) {
        *self.slot.write() = value;
    }

    pub fn to_read_reference(&self) -> DataReadReference<T> {
        DataReadReference {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: DataValue + Copy> DataWriteReference<T> {
    pub fn get(&self) -> T {
        *self.slot.read()
    }
}

impl<T: DataValue + std::fmt::Debug> std::fmt::Debug for DataWriteReference<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DataWriteReference").field(&*self.slot.read()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataAccess {
    Read,
    /// The collection's owner is the slot's single writer.
    Write,
}

/// Type-erased slot handle stored in a [`DataReferenceCollection`].
#[derive(Clone)]
pub struct AnyDataReference {
    data_type: DataType,
    access: DataAccess,
    slot: Arc<dyn Any + Send + Sync>,
}

impl AnyDataReference {
    pub fn from_read<T: DataValue>(reference: &DataReadReference<T>) -> Self {
        let slot: Arc<dyn Any + Send + Sync> = reference.slot.clone();
        Self {
            data_type: T::DATA_TYPE,
            access: DataAccess::Read,
            slot,
        }
    }

    pub fn from_write<T: DataValue>(reference: &DataWriteReference<T>) -> Self {
        let slot: Arc<dyn Any + Send + Sync> = reference.slot.clone();
        Self {
            data_type: T::DATA_TYPE,
            access: DataAccess::Write,
            slot,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn access(&self) -> DataAccess {
        self.access
    }

    /// Same handle with read access, for passing an output on as someone else's input.
    pub fn as_read(&self) -> Self {
        Self {
            access: DataAccess::Read,
            ..self.clone()
        }
    }

    pub fn to_read<T: DataValue>(&self) -> Result<DataReadReference<T>, DataReferenceError> {
        self.slot
            .clone()
            .downcast::<RwLock<T>>()
            .map(|slot| DataReadReference { slot })
            .map_err(|_| DataReferenceError::TypeMismatch {
                expected: T::DATA_TYPE,
                found: self.data_type,
            })
    }

    pub fn same_slot(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.slot) as *const (),
            Arc::as_ptr(&other.slot) as *const (),
        )
    }
}

impl std::fmt::Debug for AnyDataReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyDataReference")
            .field("data_type", &self.data_type)
            .field("access", &self.access)
            .finish()
    }
}

/// name → slot mapping used for bound inputs and operator introspection
#[derive(Debug, Clone, Default)]
pub struct DataReferenceCollection {
    references: HashMap<String, AnyDataReference>,
}

impl DataReferenceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_read_reference<T: DataValue>(&mut self, name: &str, reference: &DataReadReference<T>) {
        self.references
            .insert(name.to_string(), AnyDataReference::from_read(reference));
    }

    pub fn add_write_reference<T: DataValue>(&mut self, name: &str, reference: &DataWriteReference<T>) {
        self.references
            .insert(name.to_string(), AnyDataReference::from_write(reference));
    }

    pub fn insert(&mut self, name: &str, reference: AnyDataReference) {
        self.references.insert(name.to_string(), reference);
    }

    pub fn get(&self, name: &str) -> Option<&AnyDataReference> {
        self.references.get(name)
    }

    pub fn get_read<T: DataValue>(&self, name: &str) -> Result<DataReadReference<T>, DataReferenceError> {
        self.references
            .get(name)
            .ok_or_else(|| DataReferenceError::NotFound {
                name: name.to_string(),
            })?
            .to_read()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.references.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnyDataReference)> {
        self.references.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_observes_writes() {
        let mut writer = DataWriteReference::new(1.0f32);
        let first = writer.to_read_reference();
        let second = first.clone();

        writer.set(4.25);

        assert_eq!(first.get(), 4.25);
        assert_eq!(second.get(), 4.25);
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_erased_round_trip_and_mismatch() {
        let writer = DataWriteReference::new(7i32);
        let erased = AnyDataReference::from_write(&writer);

        assert_eq!(erased.data_type(), DataType::Int32);
        assert_eq!(erased.access(), DataAccess::Write);
        assert_eq!(erased.as_read().access(), DataAccess::Read);
        assert_eq!(erased.to_read::<i32>().unwrap().get(), 7);

        match erased.to_read::<f32>() {
            Err(DataReferenceError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, DataType::Float);
                assert_eq!(found, DataType::Int32);
            }
            other => panic!("Expected TypeMismatch, got {:?}", other.map(|r| r.get())),
        }
    }

    #[test]
    fn test_collection() {
        let writer = DataWriteReference::new(String::from("hello"));
        let other = DataWriteReference::new(false);

        let mut collection = DataReferenceCollection::new();
        collection.add_write_reference("text", &writer);
        collection.add_read_reference("flag", &other.to_read_reference());

        assert_eq!(collection.len(), 2);
        assert_eq!(collection.names(), vec!["flag", "text"]);
        assert_eq!(*collection.get_read::<String>("text").unwrap().read(), "hello");
        assert!(collection
            .get("text")
            .unwrap()
            .same_slot(&AnyDataReference::from_write(&writer)));
        assert!(!collection
            .get("flag")
            .unwrap()
            .same_slot(collection.get("text").unwrap()));
        assert_eq!(
            collection.get_read::<bool>("missing").unwrap_err(),
            DataReferenceError::NotFound {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_audio_literal_fills_block() {
        let settings = OperatorSettings::new(48000.0, 8).unwrap();

        let buffer = AudioBuffer::from_literal(&Literal::Float(0.25), &settings).unwrap();
        assert_eq!(buffer.len(), 8);
        assert!(buffer.iter().all(|s| *s == 0.25));

        assert!(AudioBuffer::from_literal(&Literal::Bool(true), &settings).is_none());
        assert_eq!(f32::from_literal(&Literal::Int32(3), &settings), Some(3.0));
        assert_eq!(i32::from_literal(&Literal::Float(3.0), &settings), None);
    }
}
