use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(IsolateId, "isolate");
id_type!(ContextId, "context");
id_type!(TemplateId, "template");
id_type!(CallbackToken, "callback");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

impl PromiseState {
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Coarse classification of an engine value, used in type-mismatch reports
/// and by the case runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    BigInt,
    String,
    Symbol,
    Function,
    Array,
    Promise,
    Object,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::BigInt => "bigint",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Function => "function",
            Self::Array => "array",
            Self::Promise => "promise",
            Self::Object => "object",
        }
    }

    pub fn is_primitive(self) -> bool {
        !matches!(
            self,
            Self::Function | Self::Array | Self::Promise | Self::Object
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapStatistics {
    pub total_heap_size: u64,
    pub total_heap_size_executable: u64,
    pub total_physical_size: u64,
    pub total_available_size: u64,
    pub used_heap_size: u64,
    pub heap_size_limit: u64,
    pub malloced_memory: u64,
    pub external_memory: u64,
    pub peak_malloced_memory: u64,
    pub number_of_native_contexts: u64,
    pub number_of_detached_contexts: u64,
}

bitflags! {
    /// Property attribute mask for template properties. Bit values match the
    /// engine's own `PropertyAttribute` encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyAttributes: u32 {
        const READ_ONLY = 1;
        const DONT_ENUM = 1 << 1;
        const DONT_DELETE = 1 << 2;
    }
}

/// Little-endian 64-bit words of a BigInt magnitude plus its sign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BigIntWords {
    pub sign_bit: bool,
    pub words: Vec<u64>,
}

impl BigIntWords {
    pub fn new(sign_bit: bool, words: Vec<u64>) -> Self {
        Self { sign_bit, words }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub fn from_i128(value: i128) -> Self {
        let magnitude = value.unsigned_abs();
        let low = magnitude as u64;
        let high = (magnitude >> 64) as u64;
        let words = if high == 0 { vec![low] } else { vec![low, high] };
        Self {
            sign_bit: value < 0,
            words,
        }
    }

    pub fn to_i128(&self) -> Option<i128> {
        let significant = self
            .words
            .iter()
            .rposition(|word| *word != 0)
            .map_or(0, |index| index + 1);
        if significant > 2 {
            return None;
        }
        let low = self.words.first().copied().unwrap_or(0) as u128;
        let high = if significant == 2 { self.words[1] as u128 } else { 0 };
        let magnitude = (high << 64) | low;
        if self.sign_bit {
            if magnitude > i128::MAX as u128 + 1 {
                return None;
            }
            Some((magnitude as i128).wrapping_neg())
        } else {
            i128::try_from(magnitude).ok()
        }
    }
}
