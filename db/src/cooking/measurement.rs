use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Largest denominator kept when simplifying a converted amount.
pub const MAX_DISPLAY_DENOMINATOR: i64 = 10;

const LIMIT_DENOMINATOR_DEFAULT: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MeasurementUnit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "l")]
    Liter,
    #[serde(rename = "ml")]
    Milliliter,
    #[serde(rename = "oz")]
    Ounce,
    #[serde(rename = "fl_oz")]
    FluidOunce,
    #[serde(rename = "pc")]
    Piece,
    #[serde(rename = "pinch")]
    Pinch,
    #[serde(rename = "cup")]
    Cup,
    #[serde(rename = "tsp")]
    Teaspoon,
    #[serde(rename = "tbsp")]
    Tablespoon,
    #[serde(rename = "dsp")]
    DessertSpoon,
    #[serde(rename = "pint")]
    Pint,
    #[serde(rename = "fl_pint")]
    FluidPint,
    #[serde(rename = "to_taste")]
    ToTaste,
}

/// Units a gram amount is re-expressed in, in display order.
const CONVERTIBLE_UNITS: [MeasurementUnit; 12] = [
    MeasurementUnit::Kilogram,
    MeasurementUnit::Liter,
    MeasurementUnit::Milliliter,
    MeasurementUnit::Ounce,
    MeasurementUnit::FluidOunce,
    MeasurementUnit::Teaspoon,
    MeasurementUnit::DessertSpoon,
    MeasurementUnit::Tablespoon,
    MeasurementUnit::Pint,
    MeasurementUnit::FluidPint,
    MeasurementUnit::Piece,
    MeasurementUnit::Cup,
];

pub const FLAVORING_UNITS: [MeasurementUnit; 2] = [MeasurementUnit::ToTaste, MeasurementUnit::Pinch];

impl MeasurementUnit {
    pub const ALL: [MeasurementUnit; 15] = [
        MeasurementUnit::Gram,
        MeasurementUnit::Kilogram,
        MeasurementUnit::Liter,
        MeasurementUnit::Milliliter,
        MeasurementUnit::Ounce,
        MeasurementUnit::FluidOunce,
        MeasurementUnit::Piece,
        MeasurementUnit::Pinch,
        MeasurementUnit::Cup,
        MeasurementUnit::Teaspoon,
        MeasurementUnit::Tablespoon,
        MeasurementUnit::DessertSpoon,
        MeasurementUnit::Pint,
        MeasurementUnit::FluidPint,
        MeasurementUnit::ToTaste,
    ];

    pub fn code(self) -> &'static str {
        match self {
            MeasurementUnit::Gram => "g",
            MeasurementUnit::Kilogram => "kg",
            MeasurementUnit::Liter => "l",
            MeasurementUnit::Milliliter => "ml",
            MeasurementUnit::Ounce => "oz",
            MeasurementUnit::FluidOunce => "fl_oz",
            MeasurementUnit::Piece => "pc",
            MeasurementUnit::Pinch => "pinch",
            MeasurementUnit::Cup => "cup",
            MeasurementUnit::Teaspoon => "tsp",
            MeasurementUnit::Tablespoon => "tbsp",
            MeasurementUnit::DessertSpoon => "dsp",
            MeasurementUnit::Pint => "pint",
            MeasurementUnit::FluidPint => "fl_pint",
            MeasurementUnit::ToTaste => "to_taste",
        }
    }

    pub fn full_name(self) -> &'static str {
        match self {
            MeasurementUnit::Gram => "gram",
            MeasurementUnit::Kilogram => "kilogram",
            MeasurementUnit::Liter => "liter",
            MeasurementUnit::Milliliter => "milliliter",
            MeasurementUnit::Ounce => "ounce",
            MeasurementUnit::FluidOunce => "fluid ounce",
            MeasurementUnit::Piece => "piece",
            MeasurementUnit::Pinch => "pinch",
            MeasurementUnit::Cup => "cup",
            MeasurementUnit::Teaspoon => "teaspoon",
            MeasurementUnit::Tablespoon => "tablespoon",
            MeasurementUnit::DessertSpoon => "dessert spoon",
            MeasurementUnit::Pint => "pint",
            MeasurementUnit::FluidPint => "fluid pint",
            MeasurementUnit::ToTaste => "to taste",
        }
    }

    pub fn is_flavoring_unit(self) -> bool {
        FLAVORING_UNITS.contains(&self)
    }

    /// Allowed amount range in tenths of the unit, `None` when any amount goes.
    fn bounds_in_tenths(self) -> Option<(i64, i64)> {
        match self {
            MeasurementUnit::Gram | MeasurementUnit::Milliliter => Some((50, 50_000)),
            MeasurementUnit::Kilogram | MeasurementUnit::Liter | MeasurementUnit::Cup => {
                Some((1, 50))
            }
            MeasurementUnit::Ounce | MeasurementUnit::FluidOunce => Some((10, 1_700)),
            MeasurementUnit::Piece => Some((10, 200)),
            MeasurementUnit::Teaspoon
            | MeasurementUnit::Tablespoon
            | MeasurementUnit::DessertSpoon => Some((1, 200)),
            MeasurementUnit::Pint | MeasurementUnit::FluidPint => Some((1, 100)),
            MeasurementUnit::Pinch => Some((10, 100)),
            MeasurementUnit::ToTaste => None,
        }
    }
}

impl fmt::Display for MeasurementUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for MeasurementUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasurementUnit::ALL
            .into_iter()
            .find(|unit| unit.code() == s)
            .ok_or_else(|| format!("Unknown measurement unit: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasurementError {
    #[error("A valid number is required.")]
    InvalidNumber,
    #[error("Ensure that there are no more than 1 decimal places.")]
    TooManyDecimalPlaces,
    #[error("Ensure that there are no more than 4 digits in total.")]
    TooManyDigits,
    #[error("Ensure that there are no more than 3 digits before the decimal point.")]
    TooManyWholeDigits,
    #[error("Ensure this value is greater than or equal to 0.")]
    Negative,
    #[error(
        "Wrong measurement unit ({measure}) for a flavoring ingredient. \
         Flavorings can be measured in: to taste, pinch."
    )]
    FlavoringMeasure { measure: String },
    #[error("Amount of {ingredient} must be between {min} {measure} and {max} {measure}.")]
    OutOfRange {
        ingredient: String,
        min: String,
        max: String,
        measure: String,
    },
}

/// An exact rational number, always stored reduced with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    numer: i64,
    denom: i64,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl Fraction {
    pub const ZERO: Fraction = Fraction { numer: 0, denom: 1 };
    pub const ONE: Fraction = Fraction { numer: 1, denom: 1 };

    pub fn new(numer: i64, denom: i64) -> Option<Self> {
        Self::reduce(i128::from(numer), i128::from(denom))
    }

    pub fn from_integer(value: i64) -> Self {
        Fraction {
            numer: value,
            denom: 1,
        }
    }

    fn reduce(numer: i128, denom: i128) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        let sign = if denom < 0 { -1 } else { 1 };
        let divisor = gcd(numer, denom).max(1);

        Some(Fraction {
            numer: i64::try_from(sign * numer / divisor).ok()?,
            denom: i64::try_from(sign * denom / divisor).ok()?,
        })
    }

    /// Parses a plain decimal literal such as `1.5`, `-2`, `0.25` or `1.5E+1`.
    pub fn from_decimal_str(raw: &str) -> Result<Self, MeasurementError> {
        let raw = raw.trim();
        let (mantissa, exponent) = match raw.split_once(|c: char| c == 'e' || c == 'E') {
            Some((mantissa, exponent)) => (
                mantissa,
                exponent
                    .parse::<i32>()
                    .map_err(|_| MeasurementError::InvalidNumber)?,
            ),
            None => (raw, 0),
        };

        let (negative, digits) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(MeasurementError::InvalidNumber);
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(MeasurementError::InvalidNumber);
        }

        let joined = format!("{int_part}{frac_part}");
        let mut numer: i128 = joined
            .trim_start_matches('0')
            .parse()
            .or_else(|_| if joined.chars().all(|c| c == '0') { Ok(0) } else { Err(()) })
            .map_err(|()| MeasurementError::InvalidNumber)?;
        let scale = i32::try_from(frac_part.len()).map_err(|_| MeasurementError::InvalidNumber)?
            - exponent;

        if negative {
            numer = -numer;
        }

        let mut denom: i128 = 1;
        if scale >= 0 {
            denom = 10_i128
                .checked_pow(scale.unsigned_abs())
                .ok_or(MeasurementError::InvalidNumber)?;
        } else {
            numer = numer
                .checked_mul(
                    10_i128
                        .checked_pow(scale.unsigned_abs())
                        .ok_or(MeasurementError::InvalidNumber)?,
                )
                .ok_or(MeasurementError::InvalidNumber)?;
        }

        Self::reduce(numer, denom).ok_or(MeasurementError::InvalidNumber)
    }

    pub fn numer(self) -> i64 {
        self.numer
    }

    pub fn denom(self) -> i64 {
        self.denom
    }

    pub fn is_zero(self) -> bool {
        self.numer == 0
    }

    pub fn checked_mul(self, other: Fraction) -> Option<Fraction> {
        Self::reduce(
            i128::from(self.numer) * i128::from(other.numer),
            i128::from(self.denom) * i128::from(other.denom),
        )
    }

    pub fn checked_div(self, other: Fraction) -> Option<Fraction> {
        Self::reduce(
            i128::from(self.numer) * i128::from(other.denom),
            i128::from(self.denom) * i128::from(other.numer),
        )
    }

    /// Closest fraction whose denominator does not exceed `max_denominator`.
    ///
    /// Walks the continued-fraction expansion and picks between the last
    /// convergent and the best semiconvergent; on a tie the convergent wins.
    pub fn limit_denominator(self, max_denominator: i64) -> Fraction {
        let max_denominator = i128::from(max_denominator.max(1));
        if i128::from(self.denom) <= max_denominator {
            return self;
        }

        let (mut p0, mut q0, mut p1, mut q1) = (0_i128, 1_i128, 1_i128, 0_i128);
        let (mut n, mut d) = (i128::from(self.numer), i128::from(self.denom));

        loop {
            let a = n.div_euclid(d);
            let q2 = q0 + a * q1;
            if q2 > max_denominator {
                break;
            }
            (p0, q0, p1, q1) = (p1, q1, p0 + a * p1, q2);
            (n, d) = (d, n - a * d);
            if d == 0 {
                break;
            }
        }

        let k = (max_denominator - q0).div_euclid(q1);
        let semiconvergent = (p0 + k * p1, q0 + k * q1);
        let convergent = (p1, q1);

        let (target_n, target_d) = (i128::from(self.numer), i128::from(self.denom));
        let distance = |(num, den): (i128, i128)| ((num * target_d - target_n * den).abs(), den * target_d);
        let (conv_num, conv_den) = distance(convergent);
        let (semi_num, semi_den) = distance(semiconvergent);

        let pick = if conv_num * semi_den <= semi_num * conv_den {
            convergent
        } else {
            semiconvergent
        };

        Self::reduce(pick.0, pick.1).unwrap_or(self)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        (i128::from(self.numer) * i128::from(other.denom))
            .cmp(&(i128::from(other.numer) * i128::from(self.denom)))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.numer)
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}

impl Serialize for Fraction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Digits an amount may have in total, matching `recipe_ingredients.amount`.
const AMOUNT_DIGITS: usize = 4;
const AMOUNT_DECIMAL_PLACES: usize = 1;

/// Parses an ingredient amount that fits `NUMERIC(4, 1)`.
pub fn parse_amount(raw: &str) -> Result<Fraction, MeasurementError> {
    let raw = raw.trim();
    let value = Fraction::from_decimal_str(raw)?;

    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let frac_part = frac_part.trim_end_matches('0');

    let whole_digits = int_part.trim_start_matches('0').len();

    if whole_digits + frac_part.len() > AMOUNT_DIGITS {
        return Err(MeasurementError::TooManyDigits);
    }
    if frac_part.len() > AMOUNT_DECIMAL_PLACES {
        return Err(MeasurementError::TooManyDecimalPlaces);
    }
    if whole_digits > AMOUNT_DIGITS - AMOUNT_DECIMAL_PLACES {
        return Err(MeasurementError::TooManyWholeDigits);
    }

    // Exponent notation slips past the digit counts above.
    if 10 % value.denom() != 0 {
        return Err(MeasurementError::TooManyDecimalPlaces);
    }
    if i128::from(value.numer()).abs() >= 1000 * i128::from(value.denom()) {
        return Err(MeasurementError::TooManyWholeDigits);
    }

    Ok(value)
}

fn fmt_tenths(tenths: i64) -> String {
    if tenths % 10 == 0 {
        (tenths / 10).to_string()
    } else {
        format!("{}.{}", tenths / 10, tenths % 10)
    }
}

/// Checks a measured amount against the unit's allowed range and the
/// flavoring-only units rule.
pub fn check_amount(
    ingredient: &str,
    is_flavoring: bool,
    unit: MeasurementUnit,
    amount: Fraction,
) -> Result<(), MeasurementError> {
    if is_flavoring && !unit.is_flavoring_unit() {
        return Err(MeasurementError::FlavoringMeasure {
            measure: unit.full_name().to_string(),
        });
    }

    if amount < Fraction::from_integer(0) {
        return Err(MeasurementError::Negative);
    }

    let Some((min, max)) = unit.bounds_in_tenths() else {
        return Ok(());
    };

    let in_range = Fraction::new(min, 10).is_some_and(|min| min <= amount)
        && Fraction::new(max, 10).is_some_and(|max| amount <= max);

    if in_range {
        Ok(())
    } else {
        Err(MeasurementError::OutOfRange {
            ingredient: ingredient.to_string(),
            min: fmt_tenths(min),
            max: fmt_tenths(max),
            measure: unit.code().to_string(),
        })
    }
}

/// Grams in one `unit`. Pieces and cups depend on per-ingredient weights.
pub fn grams_per_unit(
    unit: MeasurementUnit,
    one_piece_weight: Option<Fraction>,
    cup_grams: Option<Fraction>,
) -> Option<Fraction> {
    let fixed = |numer, denom| Fraction::new(numer, denom);

    match unit {
        MeasurementUnit::Gram | MeasurementUnit::Milliliter => fixed(1, 1),
        MeasurementUnit::Kilogram | MeasurementUnit::Liter => fixed(1000, 1),
        MeasurementUnit::Ounce => fixed(2835, 100),
        MeasurementUnit::FluidOunce => fixed(2841, 100),
        MeasurementUnit::Teaspoon => fixed(5, 1),
        MeasurementUnit::DessertSpoon => fixed(10, 1),
        MeasurementUnit::Tablespoon => fixed(15, 1),
        MeasurementUnit::Pint => fixed(4732, 10),
        MeasurementUnit::FluidPint => fixed(5683, 10),
        MeasurementUnit::Piece => one_piece_weight.filter(|w| !w.is_zero()),
        MeasurementUnit::Cup => cup_grams.filter(|w| !w.is_zero()),
        MeasurementUnit::Pinch | MeasurementUnit::ToTaste => None,
    }
}

pub fn to_grams(
    amount: Fraction,
    unit: MeasurementUnit,
    one_piece_weight: Option<Fraction>,
    cup_grams: Option<Fraction>,
) -> Option<Fraction> {
    if unit == MeasurementUnit::Gram {
        return Some(amount);
    }

    amount.checked_mul(grams_per_unit(unit, one_piece_weight, cup_grams)?)
}

/// Scales an amount written for `recipe_servings` to `requested` servings.
pub fn scale_for_servings(amount: Fraction, requested: i64, recipe_servings: i64) -> Option<Fraction> {
    amount.checked_mul(Fraction::new(requested, recipe_servings)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedMeasure {
    pub amount: Fraction,
    pub measure: MeasurementUnit,
    pub measure_full: &'static str,
}

impl ConvertedMeasure {
    fn new(amount: Fraction, measure: MeasurementUnit) -> Self {
        Self {
            amount,
            measure,
            measure_full: measure.full_name(),
        }
    }
}

/// Re-expresses an amount in grams and in every other unit that yields a
/// readable fraction (denominator of at most ten).
pub fn other_measures(
    amount: Fraction,
    unit: MeasurementUnit,
    one_piece_weight: Option<Fraction>,
    cup_grams: Option<Fraction>,
) -> Vec<ConvertedMeasure> {
    let Some(grams) = to_grams(amount, unit, one_piece_weight, cup_grams) else {
        return Vec::new();
    };
    if grams.is_zero() {
        return Vec::new();
    }

    let mut measures = vec![ConvertedMeasure::new(
        grams.limit_denominator(LIMIT_DENOMINATOR_DEFAULT),
        MeasurementUnit::Gram,
    )];

    for other in CONVERTIBLE_UNITS {
        if other == unit {
            continue;
        }
        let Some(per_unit) = grams_per_unit(other, one_piece_weight, cup_grams) else {
            continue;
        };
        let Some(converted) = grams.checked_div(per_unit) else {
            continue;
        };

        let converted = converted.limit_denominator(LIMIT_DENOMINATOR_DEFAULT);
        if converted.denom() <= MAX_DISPLAY_DENOMINATOR {
            measures.push(ConvertedMeasure::new(converted, other));
        }
    }

    measures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frac(n: i64, d: i64) -> Fraction {
        Fraction::new(n, d).unwrap()
    }

    #[test]
    fn fractions_are_reduced_and_signed_on_the_numerator() {
        assert_eq!(frac(6, 4), frac(3, 2));
        assert_eq!(frac(3, -6).to_string(), "-1/2");
        assert_eq!(frac(10, 5).to_string(), "2");
        assert!(Fraction::new(1, 0).is_none());
    }

    #[test]
    fn parses_decimal_literals() {
        assert_eq!(Fraction::from_decimal_str("1.5").unwrap(), frac(3, 2));
        assert_eq!(Fraction::from_decimal_str("0.1").unwrap(), frac(1, 10));
        assert_eq!(Fraction::from_decimal_str("50.00").unwrap(), frac(50, 1));
        assert_eq!(Fraction::from_decimal_str("-2").unwrap(), frac(-2, 1));
        assert_eq!(Fraction::from_decimal_str("1.5E+1").unwrap(), frac(15, 1));
        assert_eq!(Fraction::from_decimal_str("0").unwrap(), Fraction::ZERO);
        assert!(Fraction::from_decimal_str("abc").is_err());
        assert!(Fraction::from_decimal_str(".").is_err());
    }

    #[test]
    fn limit_denominator_matches_closest_fraction() {
        assert_eq!(frac(3_141_592, 1_000_000).limit_denominator(10), frac(22, 7));
        assert_eq!(frac(3_141_592, 1_000_000).limit_denominator(100), frac(311, 99));
        assert_eq!(frac(1, 3).limit_denominator(10), frac(1, 3));
        assert_eq!(frac(-3_141_592, 1_000_000).limit_denominator(10), frac(-22, 7));
        assert_eq!(frac(99, 100).limit_denominator(10), frac(1, 1));
    }

    #[test]
    fn amount_parsing_enforces_decimal_shape() {
        assert_eq!(parse_amount("12.5").unwrap(), frac(25, 2));
        assert_eq!(parse_amount("2.50").unwrap(), frac(5, 2));
        assert_eq!(
            parse_amount("1.25").unwrap_err(),
            MeasurementError::TooManyDecimalPlaces
        );
        assert_eq!(parse_amount("12345").unwrap_err(), MeasurementError::TooManyDigits);
        assert_eq!(parse_amount("999.9").unwrap(), frac(9999, 10));
        assert_eq!(parse_amount("0999").unwrap(), frac(999, 1));
        assert_eq!(
            parse_amount("1000").unwrap_err(),
            MeasurementError::TooManyWholeDigits
        );
        assert_eq!(
            parse_amount("1e3").unwrap_err(),
            MeasurementError::TooManyWholeDigits
        );
        assert_eq!(
            parse_amount("5000").unwrap_err().to_string(),
            "Ensure that there are no more than 3 digits before the decimal point."
        );
    }

    #[test]
    fn amounts_outside_unit_bounds_are_rejected() {
        let err = check_amount("flour", false, MeasurementUnit::Gram, frac(1, 1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Amount of flour must be between 5 g and 5000 g."
        );

        let err = check_amount("milk", false, MeasurementUnit::Cup, frac(6, 1)).unwrap_err();
        assert_eq!(err.to_string(), "Amount of milk must be between 0.1 cup and 5 cup.");

        assert!(check_amount("salt", false, MeasurementUnit::Teaspoon, frac(1, 10)).is_ok());
        assert!(check_amount("salt", true, MeasurementUnit::ToTaste, frac(0, 1)).is_ok());
    }

    #[test]
    fn negative_amounts_are_rejected_for_every_unit() {
        assert_eq!(
            check_amount("salt", true, MeasurementUnit::ToTaste, frac(-5, 1)).unwrap_err(),
            MeasurementError::Negative
        );
        assert_eq!(
            check_amount("flour", false, MeasurementUnit::Gram, frac(-1, 10)).unwrap_err(),
            MeasurementError::Negative
        );
    }

    #[test]
    fn flavorings_only_take_pinch_or_to_taste() {
        assert!(matches!(
            check_amount("pepper", true, MeasurementUnit::Gram, frac(10, 1)),
            Err(MeasurementError::FlavoringMeasure { .. })
        ));
        assert!(check_amount("pepper", true, MeasurementUnit::Pinch, frac(2, 1)).is_ok());
    }

    #[test]
    fn tablespoons_convert_to_readable_units() {
        let measures = other_measures(frac(2, 1), MeasurementUnit::Tablespoon, None, None);
        let rendered: Vec<(String, &str)> = measures
            .iter()
            .map(|m| (m.amount.to_string(), m.measure.code()))
            .collect();

        assert_eq!(
            rendered,
            vec![
                ("30".to_string(), "g"),
                ("30".to_string(), "ml"),
                ("6".to_string(), "tsp"),
                ("3".to_string(), "dsp"),
            ]
        );
    }

    #[test]
    fn kilograms_keep_thirds_but_drop_ounces() {
        let measures = other_measures(frac(1, 1), MeasurementUnit::Kilogram, None, None);
        let codes: Vec<&str> = measures.iter().map(|m| m.measure.code()).collect();

        assert_eq!(codes, vec!["g", "l", "ml", "tsp", "dsp", "tbsp"]);
        assert_eq!(measures.last().unwrap().amount, frac(200, 3));
    }

    #[test]
    fn pieces_and_cups_use_row_weights() {
        let piece_weight = Some(frac(50, 1));
        let measures = other_measures(frac(2, 1), MeasurementUnit::Piece, piece_weight, None);
        assert_eq!(measures[0].amount, frac(100, 1));
        assert!(measures
            .iter()
            .any(|m| m.measure == MeasurementUnit::Kilogram && m.amount == frac(1, 10)));
        assert!(measures.iter().all(|m| m.measure != MeasurementUnit::Piece));

        let measures = other_measures(frac(200, 1), MeasurementUnit::Gram, piece_weight, Some(frac(200, 1)));
        assert!(measures
            .iter()
            .any(|m| m.measure == MeasurementUnit::Cup && m.amount == Fraction::ONE));
        assert!(measures
            .iter()
            .any(|m| m.measure == MeasurementUnit::Piece && m.amount == frac(4, 1)));
    }

    #[test]
    fn row_weights_do_not_leak_between_conversions() {
        let with_cup = other_measures(frac(200, 1), MeasurementUnit::Gram, None, Some(frac(200, 1)));
        assert!(with_cup.iter().any(|m| m.measure == MeasurementUnit::Cup));

        let without_cup = other_measures(frac(200, 1), MeasurementUnit::Gram, None, None);
        assert!(without_cup.iter().all(|m| m.measure != MeasurementUnit::Cup));
    }

    #[test]
    fn unmeasurable_units_produce_nothing() {
        assert!(other_measures(frac(2, 1), MeasurementUnit::Pinch, None, None).is_empty());
        assert!(other_measures(frac(1, 1), MeasurementUnit::Piece, None, None).is_empty());
        assert!(other_measures(Fraction::ZERO, MeasurementUnit::Gram, None, None).is_empty());
    }

    #[test]
    fn servings_scale_amounts_exactly() {
        assert_eq!(scale_for_servings(frac(3, 1), 3, 2), Some(frac(9, 2)));
        assert_eq!(scale_for_servings(frac(3, 1), 1, 0), None);
    }

    #[test]
    fn units_round_trip_through_codes() {
        for unit in MeasurementUnit::ALL {
            assert_eq!(unit.code().parse::<MeasurementUnit>().unwrap(), unit);
        }
        assert!("spoonful".parse::<MeasurementUnit>().is_err());
    }
}
