//! Conversion between [`HostValue`] and QuickJS values.
//!
//! Host to script never reports an unconvertible value; it degrades to `null`.
//! Script to host is total over reachable values but surfaces engine failures
//! raised while reading date accessors or object properties.
//!
//! QuickJS stores integers as 32-bit values. Host integers outside `i32`
//! become doubles and lose precision past 2^53.

use anyhow::Context as _;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use rquickjs::{Array, Ctx, Function, Object, Value};

use crate::{
    error::{Error, Result, ScriptError},
    value::HostValue,
};

/// Helpers are captured before any user code runs so a script cannot swap
/// out the functions used to classify and build values.
///
/// `toDouble` reads the value back out of a `Float64Array`, which yields a
/// double-tagged value even for whole numbers; plain number construction
/// would store `2.0` as the integer `2`.
const HELPERS: &str = r"(function () {
    'use strict';
    const DateCtor = typeof Date === 'function' ? Date : undefined;
    const proto = DateCtor ? DateCtor.prototype : undefined;
    const getTime = proto ? proto.getTime : undefined;
    const getters = proto ? [
        proto.getFullYear,
        proto.getMonth,
        proto.getDate,
        proto.getHours,
        proto.getMinutes,
        proto.getSeconds,
    ] : [];
    const scratch = typeof Float64Array === 'function' ? new Float64Array(1) : undefined;
    return {
        makeDate: DateCtor ? function (y, m, d, h, mi, s) {
            const date = new DateCtor(0);
            date.setFullYear(y, m, d);
            date.setHours(h, mi, s, 0);
            return date;
        } : null,
        dateParts: function (d) {
            const parts = [];
            for (let i = 0; i < getters.length; i++) {
                parts[i] = getters[i].call(d);
            }
            return parts;
        },
        toDouble: scratch ? function (v) {
            scratch[0] = v;
            return scratch[0];
        } : null,
        isDate: function (v) {
            if (!getTime) {
                return false;
            }
            try {
                getTime.call(v);
                return true;
            } catch (e) {
                return false;
            }
        },
        hasIndex: function (a, i) {
            return i in a;
        },
        keys: function (o) {
            const keys = [];
            for (const k in o) {
                keys.push(k);
            }
            return keys;
        },
    };
})()";

/// A value owned by the engine. The `'js` lifetime ties it to the context it
/// was created in, so it cannot outlive that context.
#[derive(Clone, Debug)]
pub struct ScriptValue<'js>(Value<'js>);

impl<'js> ScriptValue<'js> {
    #[must_use]
    pub const fn new(value: Value<'js>) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_value(&self) -> &Value<'js> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value<'js> {
        self.0
    }
}

enum Kind<'js> {
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    String(rquickjs::String<'js>),
    Array(Array<'js>),
    Object(Object<'js>),
}

impl<'js> Kind<'js> {
    /// Undefined, symbols and bigints all fall through to `Null`.
    fn of(value: &Value<'js>) -> Self {
        if let Some(b) = value.as_bool() {
            Self::Bool(b)
        } else if let Some(i) = value.as_int() {
            Self::Int(i)
        } else if let Some(f) = value.as_float() {
            Self::Float(f)
        } else if let Some(s) = value.as_string() {
            Self::String(s.clone())
        } else if let Some(arr) = value.as_array() {
            Self::Array(arr.clone())
        } else if let Some(obj) = value.as_object() {
            Self::Object(obj.clone())
        } else {
            Self::Null
        }
    }
}

pub struct Marshaler<'js> {
    ctx: Ctx<'js>,
    make_date: Option<Function<'js>>,
    date_parts: Function<'js>,
    to_double: Option<Function<'js>>,
    date_check: Function<'js>,
    index_check: Function<'js>,
    enumerate: Function<'js>,
    max_depth: usize,
}

impl<'js> Marshaler<'js> {
    /// # Errors
    /// Returns [`Error::EngineInit`] if the helper functions cannot be
    /// compiled in this context.
    pub fn new(ctx: Ctx<'js>, max_depth: usize) -> Result<Self> {
        let init = || -> rquickjs::Result<Self> {
            let helpers: Object<'js> = ctx.eval(HELPERS)?;
            Ok(Self {
                make_date: helpers.get("makeDate")?,
                date_parts: helpers.get("dateParts")?,
                to_double: helpers.get("toDouble")?,
                date_check: helpers.get("isDate")?,
                index_check: helpers.get("hasIndex")?,
                enumerate: helpers.get("keys")?,
                ctx: ctx.clone(),
                max_depth,
            })
        };
        init()
            .map_err(|err| anyhow::anyhow!(ScriptError::capture(&ctx, err).to_string()))
            .context("unable to install marshaling helpers")
            .map_err(Error::EngineInit)
    }

    #[must_use]
    pub const fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    /// Convert a host value into a script value.
    ///
    /// # Errors
    /// Fails with [`Error::DepthLimit`] when containers nest deeper than the
    /// configured limit, or [`Error::Conversion`] if the engine cannot
    /// allocate the value.
    pub fn to_script(&self, value: &HostValue) -> Result<ScriptValue<'js>> {
        self.to_script_at(value, 0).map(ScriptValue)
    }

    /// Convert a script value into a host value.
    ///
    /// # Errors
    /// Fails with [`Error::Conversion`] when a date accessor or a property read
    /// throws, and with [`Error::DepthLimit`] on excessive (or cyclic)
    /// nesting.
    pub fn to_host(&self, value: &ScriptValue<'js>) -> Result<HostValue> {
        self.to_host_at(&value.0, 0)
    }

    fn descend(&self, depth: usize) -> Result<usize> {
        if depth >= self.max_depth {
            return Err(Error::DepthLimit {
                limit: self.max_depth,
            });
        }
        Ok(depth + 1)
    }

    fn engine_error(&self, err: rquickjs::Error) -> Error {
        Error::Conversion(ScriptError::capture(&self.ctx, err))
    }

    fn to_script_at(&self, value: &HostValue, depth: usize) -> Result<Value<'js>> {
        let ctx = self.ctx.clone();
        let converted = match value {
            HostValue::Null => Value::new_null(ctx),
            HostValue::Bool(b) => Value::new_bool(ctx, *b),
            HostValue::Int(i) => match i32::try_from(*i) {
                Ok(small) => Value::new_int(ctx, small),
                #[allow(clippy::cast_precision_loss)]
                Err(_) => Value::new_float(ctx, *i as f64),
            },
            HostValue::Float(f) => self.float_to_script(*f)?,
            HostValue::String(s) => rquickjs::String::from_str(ctx, s)
                .map_err(|e| self.engine_error(e))?
                .into_value(),
            HostValue::List(items) | HostValue::Tuple(items) => {
                let depth = self.descend(depth)?;
                let arr = Array::new(ctx).map_err(|e| self.engine_error(e))?;
                for (index, item) in items.iter().enumerate() {
                    let item = self.to_script_at(item, depth)?;
                    arr.set(index, item).map_err(|e| self.engine_error(e))?;
                }
                arr.into_value()
            }
            HostValue::Mapping(_) => {
                let depth = self.descend(depth)?;
                let obj = Object::new(ctx).map_err(|e| self.engine_error(e))?;
                self.populate(&obj, value, depth)?;
                obj.into_value()
            }
            HostValue::DateTime(dt) => self.date_to_script(dt)?,
        };
        Ok(converted)
    }

    /// Set every string-keyed entry of `mapping` as a property of `obj`,
    /// e.g. the global scope. Non-string keys are skipped.
    ///
    /// # Errors
    /// Same as [`to_script`](Self::to_script).
    pub fn install(&self, obj: &Object<'js>, mapping: &HostValue) -> Result<()> {
        let depth = self.descend(0)?;
        self.populate(obj, mapping, depth)
    }

    /// Copy the string-keyed entries of `mapping` from `source`, an object
    /// already built from it, onto `target`. Both then refer to the same
    /// script values.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] if a property cannot be read or set.
    pub fn share(
        &self,
        target: &Object<'js>,
        source: &Object<'js>,
        mapping: &HostValue,
    ) -> Result<()> {
        for (key, _) in mapping.string_entries() {
            let value: Value<'js> = source.get(key).map_err(|e| self.engine_error(e))?;
            target.set(key, value).map_err(|e| self.engine_error(e))?;
        }
        Ok(())
    }

    fn populate(&self, obj: &Object<'js>, mapping: &HostValue, depth: usize) -> Result<()> {
        for (key, value) in mapping.string_entries() {
            let value = self.to_script_at(value, depth)?;
            obj.set(key, value).map_err(|e| self.engine_error(e))?;
        }
        Ok(())
    }

    fn float_to_script(&self, value: f64) -> Result<Value<'js>> {
        match &self.to_double {
            Some(to_double) if value.fract() == 0.0 => {
                to_double.call((value,)).map_err(|e| self.engine_error(e))
            }
            _ => Ok(Value::new_float(self.ctx.clone(), value)),
        }
    }

    fn date_to_script(&self, dt: &NaiveDateTime) -> Result<Value<'js>> {
        let Some(make_date) = &self.make_date else {
            // No Date constructor without the standard library.
            return Ok(Value::new_null(self.ctx.clone()));
        };
        // Engine months are zero-indexed.
        make_date
            .call((
                dt.year(),
                dt.month() - 1,
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second(),
            ))
            .map_err(|e| self.engine_error(e))
    }

    fn to_host_at(&self, value: &Value<'js>, depth: usize) -> Result<HostValue> {
        let converted = match Kind::of(value) {
            Kind::Null => HostValue::Null,
            Kind::Bool(b) => HostValue::Bool(b),
            Kind::Int(i) => HostValue::Int(i64::from(i)),
            Kind::Float(f) => HostValue::Float(f),
            Kind::String(s) => {
                HostValue::String(s.to_string().map_err(|e| self.engine_error(e))?)
            }
            Kind::Array(arr) => {
                let depth = self.descend(depth)?;
                self.list_to_host(&arr, depth)?
            }
            Kind::Object(obj) => {
                let depth = self.descend(depth)?;
                if self.is_date(&obj)? {
                    self.date_to_host(&obj)?
                } else {
                    self.mapping_to_host(&obj, depth)?
                }
            }
        };
        Ok(converted)
    }

    fn is_date(&self, obj: &Object<'js>) -> Result<bool> {
        self.date_check
            .call((obj.clone(),))
            .map_err(|e| self.engine_error(e))
    }

    /// Holes and elements whose read throws are dropped, so sparse arrays
    /// come back compacted.
    fn list_to_host(&self, arr: &Array<'js>, depth: usize) -> Result<HostValue> {
        let len = arr.len();
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            match arr.get::<Value<'js>>(index) {
                Ok(item) if item.is_undefined() && !self.has_index(arr, index) => {}
                Ok(item) => items.push(self.to_host_at(&item, depth)?),
                Err(_) => {
                    // Discard the pending exception; the element is skipped.
                    let _ = self.ctx.catch();
                }
            }
        }
        Ok(HostValue::List(items))
    }

    fn has_index(&self, arr: &Array<'js>, index: usize) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let index = index as f64;
        self.index_check
            .call::<_, bool>((arr.clone(), index))
            .unwrap_or_else(|_| {
                let _ = self.ctx.catch();
                false
            })
    }

    /// Own and inherited enumerable properties in engine order. A failed
    /// enumeration yields `Null` rather than a partial mapping.
    fn mapping_to_host(&self, obj: &Object<'js>, depth: usize) -> Result<HostValue> {
        let keys: Array<'js> = match self.enumerate.call((obj.clone(),)) {
            Ok(keys) => keys,
            Err(_) => {
                let _ = self.ctx.catch();
                return Ok(HostValue::Null);
            }
        };

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys.iter::<Value<'js>>() {
            let key = key.map_err(|e| self.engine_error(e))?;
            let HostValue::String(name) = self.to_host_at(&key, depth)? else {
                continue;
            };
            let value: Value<'js> = obj
                .get(name.as_str())
                .map_err(|e| self.engine_error(e))?;
            let value = self.to_host_at(&value, depth)?;
            entries.push((HostValue::String(name), value));
        }
        Ok(HostValue::Mapping(entries))
    }

    /// Dates are read through the local-time accessors, mirroring how
    /// `makeDate` builds them.
    fn date_to_host(&self, obj: &Object<'js>) -> Result<HostValue> {
        let parts: Array<'js> = self
            .date_parts
            .call((obj.clone(),))
            .map_err(|e| self.engine_error(e))?;
        let mut fields = [0_i32; 6];
        for (index, field) in fields.iter_mut().enumerate() {
            let value: f64 = parts.get(index).map_err(|e| self.engine_error(e))?;
            if !value.is_finite() || value.fract() != 0.0 || value.abs() > f64::from(i32::MAX) {
                return Err(Error::Conversion(ScriptError::new(
                    "date accessor returned a non-integral value (invalid date?)",
                )));
            }
            #[allow(clippy::cast_possible_truncation)]
            let value = value as i32;
            *field = value;
        }
        // Engine months are zero-indexed.
        fields[1] += 1;

        naive_datetime(fields)
            .map(HostValue::DateTime)
            .ok_or_else(|| Error::Conversion(ScriptError::new("date value is out of range")))
    }
}

fn naive_datetime([year, month, day, hour, minute, second]: [i32; 6]) -> Option<NaiveDateTime> {
    let field = |v: i32| u32::try_from(v).ok();
    NaiveDate::from_ymd_opt(year, field(month)?, field(day)?)?.and_hms_opt(
        field(hour)?,
        field(minute)?,
        field(second)?,
    )
}
