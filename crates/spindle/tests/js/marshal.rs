use anyhow::{Context as _, Result};
use spindle::{ContextConfig, Error as SpindleError, ExecuteOptions, GlobalsConfig, HostValue};

use super::common::{datetime, eval, eval_with, mapping, roundtrip};

#[test]
fn scalars_round_trip() -> Result<()> {
    for value in [
        HostValue::Null,
        HostValue::Bool(true),
        HostValue::Bool(false),
        HostValue::Int(0),
        HostValue::Int(-7),
        HostValue::Int(i64::from(i32::MAX)),
        HostValue::Int(i64::from(i32::MIN)),
        HostValue::Float(1.5),
        HostValue::Float(-0.25),
        HostValue::Float(2.0),
        HostValue::Float(0.0),
        HostValue::Float(-3.0),
        HostValue::Float(1e300),
        HostValue::from(""),
        HostValue::from("héllo wörld ✓"),
    ] {
        assert_eq!(roundtrip(&value)?, value);
    }
    Ok(())
}

#[test]
fn whole_floats_stay_floats_through_params() -> Result<()> {
    let params = mapping([("f", HostValue::Float(2.0)), ("i", HostValue::Int(2))]);
    assert_eq!(
        eval_with("[f, i, f === i]", &params)?,
        HostValue::List(vec![
            HostValue::Float(2.0),
            HostValue::Int(2),
            HostValue::Bool(true),
        ])
    );
    Ok(())
}

#[test]
fn negative_zero_keeps_its_sign() -> Result<()> {
    let back = roundtrip(&HostValue::Float(-0.0))?;
    assert!(
        back.as_f64().is_some_and(|f| f == 0.0 && f.is_sign_negative()),
        "{back:?}"
    );
    Ok(())
}

#[test]
fn nan_survives_as_float() -> Result<()> {
    let back = roundtrip(&HostValue::Float(f64::NAN))?;
    assert!(back.as_f64().is_some_and(f64::is_nan), "{back:?}");
    Ok(())
}

#[test]
fn wide_integers_become_floats() -> Result<()> {
    let wide = i64::from(i32::MAX) + 1;
    #[allow(clippy::cast_precision_loss)]
    let expected = HostValue::Float(wide as f64);
    assert_eq!(roundtrip(&HostValue::Int(wide))?, expected);
    Ok(())
}

#[test]
fn tuples_come_back_as_lists() -> Result<()> {
    let tuple = HostValue::Tuple(vec![HostValue::Int(1), HostValue::from("two")]);
    assert_eq!(
        roundtrip(&tuple)?,
        HostValue::List(vec![HostValue::Int(1), HostValue::from("two")])
    );
    Ok(())
}

#[test]
fn mapping_keeps_insertion_order() -> Result<()> {
    let value = mapping([
        ("zeta", HostValue::Int(1)),
        ("alpha", HostValue::Int(2)),
        ("mid", HostValue::Int(3)),
    ]);
    assert_eq!(roundtrip(&value)?, value);
    Ok(())
}

#[test]
fn non_string_keys_are_skipped() -> Result<()> {
    let params = HostValue::Mapping(vec![
        (HostValue::from("kept"), HostValue::Int(1)),
        (HostValue::Int(2), HostValue::Int(2)),
    ]);
    let keys = eval_with("Object.keys(params)", &params)?;
    assert_eq!(keys, HostValue::List(vec![HostValue::from("kept")]));
    Ok(())
}

#[test]
fn datetime_round_trip_truncates_subseconds() -> Result<()> {
    let exact = datetime((2024, 2, 29), (23, 59, 58))?;
    let with_fraction = exact
        .checked_add_signed(chrono::TimeDelta::milliseconds(750))
        .context("valid offset")?;
    assert_eq!(
        roundtrip(&HostValue::DateTime(with_fraction))?,
        HostValue::DateTime(exact)
    );
    Ok(())
}

#[test]
fn datetime_month_boundaries() -> Result<()> {
    for (date, script_month) in [((2023, 12, 31), 11), ((2024, 1, 1), 0)] {
        let dt = datetime(date, (12, 0, 0))?;
        let params = mapping([("when", HostValue::DateTime(dt))]);
        assert_eq!(roundtrip(&HostValue::DateTime(dt))?, HostValue::DateTime(dt));
        assert_eq!(
            eval_with("when.getMonth()", &params)?,
            HostValue::Int(script_month)
        );
    }
    Ok(())
}

#[test]
fn two_digit_years_are_not_shifted() -> Result<()> {
    let dt = datetime((50, 6, 15), (1, 2, 3))?;
    assert_eq!(roundtrip(&HostValue::DateTime(dt))?, HostValue::DateTime(dt));
    Ok(())
}

#[test]
fn script_dates_convert_from_local_fields() -> Result<()> {
    let value = eval("new Date(2020, 0, 2, 3, 4, 5, 600)")?;
    assert_eq!(value, HostValue::DateTime(datetime((2020, 1, 2), (3, 4, 5))?));
    Ok(())
}

#[test]
fn invalid_date_is_a_conversion_error() {
    let err = eval("new Date(NaN)").expect_err("invalid date");
    assert!(
        matches!(
            err.downcast_ref::<SpindleError>(),
            Some(SpindleError::Conversion(_))
        ),
        "{err:#}"
    );
}

#[test]
fn dates_without_standard_library_become_null() -> Result<()> {
    let options = ExecuteOptions::default().context(
        ContextConfig::default().globals(GlobalsConfig::default().standard_library(false)),
    );
    let params = mapping([("when", HostValue::DateTime(datetime((2020, 1, 1), (0, 0, 0))?))]);
    assert_eq!(options.execute("when", Some(&params))?, HostValue::Null);
    Ok(())
}

#[test]
fn sparse_arrays_are_compacted() -> Result<()> {
    let value = eval("var a = [1]; a[3] = 4; a")?;
    assert_eq!(value, HostValue::List(vec![HostValue::Int(1), HostValue::Int(4)]));

    let value = eval("[1, undefined, 3]")?;
    assert_eq!(
        value,
        HostValue::List(vec![HostValue::Int(1), HostValue::Null, HostValue::Int(3)])
    );
    Ok(())
}

#[test]
fn throwing_element_is_skipped() -> Result<()> {
    let value = eval(
        "var a = [1, 2, 3];
         Object.defineProperty(a, 1, { get() { throw new Error('nope'); } });
         a",
    )?;
    assert_eq!(value, HostValue::List(vec![HostValue::Int(1), HostValue::Int(3)]));
    Ok(())
}

#[test]
fn throwing_property_is_a_conversion_error() {
    let err = eval("({ get broken() { throw new Error('nope'); } })").expect_err("getter throws");
    let Some(SpindleError::Conversion(detail)) = err.downcast_ref::<SpindleError>() else {
        panic!("expected conversion error, got {err:#}");
    };
    assert!(detail.message.contains("nope"), "{detail:?}");
}

#[test]
fn inherited_enumerable_properties_follow_own() -> Result<()> {
    let value = eval(
        "var base = { inherited: 1 };
         var child = Object.create(base);
         child.own = 2;
         child",
    )?;
    assert_eq!(
        value,
        mapping([("own", HostValue::Int(2)), ("inherited", HostValue::Int(1))])
    );
    Ok(())
}

#[test]
fn non_data_values_degrade() -> Result<()> {
    assert_eq!(eval("(function () {})")?, HostValue::Mapping(vec![]));
    assert_eq!(eval("Symbol('s')")?, HostValue::Null);
    assert_eq!(eval("[undefined]")?, HostValue::List(vec![HostValue::Null]));
    Ok(())
}

#[test]
fn helpers_survive_user_tampering() -> Result<()> {
    let value = eval(
        "Date.prototype.getTime = function () { throw new Error('patched'); };
         Date.prototype.getHours = function () { return 99; };
         new Date(2001, 1, 3, 4)",
    )?;
    assert_eq!(value, HostValue::DateTime(datetime((2001, 2, 3), (4, 0, 0))?));
    Ok(())
}
