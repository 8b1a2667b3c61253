/// Closed unit enumeration with SI intermediates. Length → meters, mass →
/// kilograms, volume → liters, duration → seconds; temperature converts
/// through kelvin with offset handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Length,
    Mass,
    Temperature,
    Volume,
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    pub name: &'static str,
    pub dimension: Dimension,
    /// Multiplier into the dimension's SI intermediate (unused for
    /// temperature).
    factor: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    #[error("unknown unit: {0}")]
    UnknownUnit(String),
    #[error("cannot convert {0:?} to {1:?}")]
    DimensionMismatch(Dimension, Dimension),
}

macro_rules! unit {
    ($name:expr, $dim:ident, $factor:expr) => {
        Unit {
            name: $name,
            dimension: Dimension::$dim,
            factor: $factor,
        }
    };
}

const UNITS: &[(&[&str], Unit)] = &[
    // Length (meters)
    (&["mm", "millimeter", "millimeters"], unit!("mm", Length, 0.001)),
    (&["cm", "centimeter", "centimeters"], unit!("cm", Length, 0.01)),
    (&["m", "meter", "meters", "metre", "metres"], unit!("m", Length, 1.0)),
    (&["km", "kilometer", "kilometers"], unit!("km", Length, 1000.0)),
    (&["in", "inch", "inches"], unit!("in", Length, 0.0254)),
    (&["ft", "foot", "feet"], unit!("ft", Length, 0.3048)),
    (&["yd", "yard", "yards"], unit!("yd", Length, 0.9144)),
    (&["mi", "mile", "miles"], unit!("mi", Length, 1609.344)),
    // Mass (kilograms)
    (&["mg", "milligram", "milligrams"], unit!("mg", Mass, 1e-6)),
    (&["g", "gram", "grams"], unit!("g", Mass, 0.001)),
    (&["kg", "kilogram", "kilograms"], unit!("kg", Mass, 1.0)),
    (&["lb", "lbs", "pound", "pounds"], unit!("lb", Mass, 0.45359237)),
    (&["oz", "ounce", "ounces"], unit!("oz", Mass, 0.028349523125)),
    (&["t", "tonne", "tonnes", "ton", "tons"], unit!("t", Mass, 1000.0)),
    // Temperature (kelvin; factor unused)
    (&["c", "celsius", "°c"], unit!("c", Temperature, 1.0)),
    (&["f", "fahrenheit", "°f"], unit!("f", Temperature, 1.0)),
    (&["k", "kelvin"], unit!("k", Temperature, 1.0)),
    // Volume (liters)
    (&["ml", "milliliter", "milliliters"], unit!("ml", Volume, 0.001)),
    (&["l", "liter", "liters", "litre", "litres"], unit!("l", Volume, 1.0)),
    (&["gal", "gallon", "gallons"], unit!("gal", Volume, 3.785411784)),
    (&["qt", "quart", "quarts"], unit!("qt", Volume, 0.946352946)),
    (&["pt", "pint", "pints"], unit!("pt", Volume, 0.473176473)),
    (&["cup", "cups"], unit!("cup", Volume, 0.2365882365)),
    (&["floz"], unit!("floz", Volume, 0.0295735295625)),
    // Duration (seconds)
    (&["s", "sec", "secs", "second", "seconds"], unit!("s", Duration, 1.0)),
    (&["min", "minute", "minutes"], unit!("min", Duration, 60.0)),
    (&["h", "hr", "hour", "hours"], unit!("h", Duration, 3600.0)),
    (&["day", "days"], unit!("day", Duration, 86_400.0)),
    (&["week", "weeks"], unit!("week", Duration, 604_800.0)),
];

pub fn lookup_unit(name: &str) -> Result<Unit, UnitError> {
    let needle = name.trim().to_lowercase();
    for (aliases, unit) in UNITS {
        if aliases.contains(&needle.as_str()) {
            return Ok(*unit);
        }
    }
    Err(UnitError::UnknownUnit(name.to_string()))
}

fn temp_to_kelvin(value: f64, unit: &Unit) -> f64 {
    match unit.name {
        "c" => value + 273.15,
        "f" => (value - 32.0) * 5.0 / 9.0 + 273.15,
        _ => value,
    }
}

fn temp_from_kelvin(kelvin: f64, unit: &Unit) -> f64 {
    match unit.name {
        "c" => kelvin - 273.15,
        "f" => (kelvin - 273.15) * 9.0 / 5.0 + 32.0,
        _ => kelvin,
    }
}

/// Bidirectional conversion through the SI intermediate.
pub fn convert(amount: f64, from: &Unit, to: &Unit) -> Result<f64, UnitError> {
    if from.dimension != to.dimension {
        return Err(UnitError::DimensionMismatch(from.dimension, to.dimension));
    }
    if from.dimension == Dimension::Temperature {
        return Ok(temp_from_kelvin(temp_to_kelvin(amount, from), to));
    }
    Ok(amount * from.factor / to.factor)
}

/// Parse "10 km to mi" / "3.5kg in lbs" shapes.
pub fn parse_conversion(text: &str) -> Option<(f64, Unit, Unit)> {
    use regex::Regex;
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(-?\d+(?:\.\d+)?)\s*([a-z°]+)\s+(?:to|in|as)\s+([a-z°]+)\s*$")
            .unwrap()
    });

    let cap = re.captures(text)?;
    let amount: f64 = cap[1].parse().ok()?;
    let from = lookup_unit(&cap[2]).ok()?;
    let to = lookup_unit(&cap[3]).ok()?;
    Some((amount, from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn length_round_trip() {
        let km = lookup_unit("km").unwrap();
        let mi = lookup_unit("miles").unwrap();
        let out = convert(10.0, &km, &mi).unwrap();
        assert!(close(out, 6.213711922373339));
        assert!(close(convert(out, &mi, &km).unwrap(), 10.0));
    }

    #[test]
    fn temperature_offsets() {
        let c = lookup_unit("celsius").unwrap();
        let f = lookup_unit("f").unwrap();
        assert!(close(convert(100.0, &c, &f).unwrap(), 212.0));
        assert!(close(convert(32.0, &f, &c).unwrap(), 0.0));
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let kg = lookup_unit("kg").unwrap();
        let m = lookup_unit("m").unwrap();
        assert!(matches!(
            convert(1.0, &kg, &m),
            Err(UnitError::DimensionMismatch(..))
        ));
    }

    #[test]
    fn parses_query_shapes() {
        let (amount, from, to) = parse_conversion("10 km to mi").unwrap();
        assert_eq!(amount, 10.0);
        assert_eq!(from.name, "km");
        assert_eq!(to.name, "mi");
        assert!(parse_conversion("3.5kg in lbs").is_some());
        assert!(parse_conversion("km to mi").is_none());
        assert!(parse_conversion("rust tutorial").is_none());
    }
}
