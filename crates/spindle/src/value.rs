use chrono::NaiveDateTime;

/// A value in the host's type system.
///
/// Values are produced and consumed at the crate boundary. The marshaler only
/// ever reads them; conversion never mutates the source value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<HostValue>),
    /// Ordered container that is not a list. Marshals like [`HostValue::List`]
    /// and always comes back as one.
    Tuple(Vec<HostValue>),
    /// Key/value pairs in insertion order. Only [`HostValue::String`] keys
    /// are visible to scripts; any other key is skipped when marshaling.
    Mapping(Vec<(HostValue, HostValue)>),
    /// Naive date and time. Sub-second precision is dropped by the engine.
    DateTime(NaiveDateTime),
}

impl HostValue {
    /// Name of the variant, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Mapping(_) => "mapping",
            Self::DateTime(_) => "datetime",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Look up a string key in a mapping. Returns the first match.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        let Self::Mapping(entries) = self else {
            return None;
        };
        entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Iterate the string-keyed entries of a mapping, skipping other keys.
    pub fn string_entries(&self) -> impl Iterator<Item = (&str, &Self)> {
        let entries = match self {
            Self::Mapping(entries) => entries.as_slice(),
            _ => &[],
        };
        entries
            .iter()
            .filter_map(|(k, v)| k.as_str().map(|k| (k, v)))
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<NaiveDateTime> for HostValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for HostValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<K: Into<Self>, V: Into<Self>> FromIterator<(K, V)> for HostValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Mapping(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use std::fmt;

    use serde::{
        Deserialize, Deserializer, Serialize, Serializer,
        de::{MapAccess, SeqAccess, Visitor},
        ser::{SerializeMap, SerializeSeq},
    };

    use super::HostValue;

    const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    impl Serialize for HostValue {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match self {
                Self::Null => serializer.serialize_unit(),
                Self::Bool(b) => serializer.serialize_bool(*b),
                Self::Int(i) => serializer.serialize_i64(*i),
                Self::Float(f) => serializer.serialize_f64(*f),
                Self::String(s) => serializer.serialize_str(s),
                Self::List(items) | Self::Tuple(items) => {
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in items {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
                Self::Mapping(_) => {
                    let mut map = serializer.serialize_map(None)?;
                    for (key, value) in self.string_entries() {
                        map.serialize_entry(key, value)?;
                    }
                    map.end()
                }
                Self::DateTime(dt) => {
                    serializer.collect_str(&dt.format(DATETIME_FORMAT))
                }
            }
        }
    }

    struct HostValueVisitor;

    impl<'de> Visitor<'de> for HostValueVisitor {
        type Value = HostValue;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a value representable as a host value")
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(HostValue::Bool(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(HostValue::Int(v))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            #[allow(clippy::cast_precision_loss)]
            let fallback = v as f64;
            Ok(i64::try_from(v).map_or(HostValue::Float(fallback), HostValue::Int))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(HostValue::Float(v))
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(HostValue::String(v.to_string()))
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
            Ok(HostValue::String(v))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(HostValue::Null)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(HostValue::Null)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            HostValue::deserialize(deserializer)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(item) = seq.next_element()? {
                items.push(item);
            }
            Ok(HostValue::List(items))
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, HostValue>()? {
                entries.push((HostValue::String(key), value));
            }
            Ok(HostValue::Mapping(entries))
        }
    }

    impl<'de> Deserialize<'de> for HostValue {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(HostValueVisitor)
        }
    }

    impl HostValue {
        /// Parse a JSON document into a host value.
        ///
        /// # Errors
        /// Returns an error if the input is not valid JSON.
        pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
            serde_json::from_str(json)
        }

        /// Render a host value as JSON. Dates become ISO-8601 strings and
        /// non-string mapping keys are dropped.
        ///
        /// # Errors
        /// Returns an error if serialization fails (e.g. a non-finite float).
        pub fn to_json(&self) -> Result<String, serde_json::Error> {
            serde_json::to_string(self)
        }
    }
}
