//! Runtime unit expressions with dimensional analysis.
//!
//! Field descriptors carry unit strings such as `g/cm**3` or legacy LaTeX forms like
//! `\rm{g}/\rm{cm}^3`. A [`UnitRegistry`] parses those strings into [`Unit`]s that know
//! their physical [`Dimensions`] and their scale factor to CGS. Each dataset owns a
//! registry extended with its own code units (`code_length`, `code_mass`, ...).
use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const EXPONENT_EPSILON: f64 = 1e-9;

/// Exponents of the base dimensions (mass, length, time, temperature).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Dimensions {
    pub mass: f64,
    pub length: f64,
    pub time: f64,
    pub temperature: f64,
}

impl Dimensions {
    pub const NONE: Dimensions = Dimensions::new(0.0, 0.0, 0.0, 0.0);
    pub const MASS: Dimensions = Dimensions::new(1.0, 0.0, 0.0, 0.0);
    pub const LENGTH: Dimensions = Dimensions::new(0.0, 1.0, 0.0, 0.0);
    pub const TIME: Dimensions = Dimensions::new(0.0, 0.0, 1.0, 0.0);
    pub const TEMPERATURE: Dimensions = Dimensions::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(mass: f64, length: f64, time: f64, temperature: f64) -> Self {
        Self {
            mass,
            length,
            time,
            temperature,
        }
    }

    fn exponents(&self) -> [f64; 4] {
        [self.mass, self.length, self.time, self.temperature]
    }

    pub fn mul(self, other: Dimensions) -> Dimensions {
        Dimensions::new(
            self.mass + other.mass,
            self.length + other.length,
            self.time + other.time,
            self.temperature + other.temperature,
        )
    }

    pub fn div(self, other: Dimensions) -> Dimensions {
        self.mul(other.powf(-1.0))
    }

    pub fn powf(self, p: f64) -> Dimensions {
        Dimensions::new(
            self.mass * p,
            self.length * p,
            self.time * p,
            self.temperature * p,
        )
    }

    /// Compares exponents with a small tolerance so `sqrt(K)**2 == K`.
    pub fn approx_eq(&self, other: &Dimensions) -> bool {
        self.exponents()
            .iter()
            .zip(other.exponents())
            .all(|(a, b)| (a - b).abs() < EXPONENT_EPSILON)
    }

    pub fn is_dimensionless(&self) -> bool {
        self.approx_eq(&Dimensions::NONE)
    }

    /// Canonical CGS expression for these dimensions, e.g. `g*cm**2/s**2`.
    pub fn cgs_expr(&self) -> String {
        let symbols = ["g", "cm", "s", "K"];
        let mut numerator = Vec::new();
        let mut denominator = Vec::new();
        for (symbol, exp) in symbols.iter().zip(self.exponents()) {
            if exp.abs() < EXPONENT_EPSILON {
                continue;
            }
            let target = if exp > 0.0 {
                &mut numerator
            } else {
                &mut denominator
            };
            target.push(format_power(symbol, exp.abs()));
        }
        match (numerator.is_empty(), denominator.is_empty()) {
            (true, true) => "dimensionless".to_string(),
            (false, true) => numerator.join("*"),
            (true, false) => format!("1/{}", denominator.join("/")),
            (false, false) => format!("{}/{}", numerator.join("*"), denominator.join("/")),
        }
    }
}

fn format_power(symbol: &str, exp: f64) -> String {
    if (exp - 1.0).abs() < EXPONENT_EPSILON {
        symbol.to_string()
    } else if (exp - exp.round()).abs() < EXPONENT_EPSILON {
        format!("{symbol}**{}", exp.round() as i64)
    } else {
        format!("{symbol}**{exp}")
    }
}

/// A parsed unit: display expression, physical dimensions and scale to CGS.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct Unit {
    expr: String,
    dims: Dimensions,
    cgs_factor: f64,
}

impl Unit {
    pub fn new(expr: impl Into<String>, dims: Dimensions, cgs_factor: f64) -> Self {
        Self {
            expr: expr.into(),
            dims,
            cgs_factor,
        }
    }

    pub fn dimensionless() -> Self {
        Unit::new("dimensionless", Dimensions::NONE, 1.0)
    }

    /// The CGS unit with the given dimensions.
    pub fn cgs(dims: Dimensions) -> Self {
        Unit::new(dims.cgs_expr(), dims, 1.0)
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn cgs_factor(&self) -> f64 {
        self.cgs_factor
    }

    /// True for pure numbers with unit scale.
    pub fn is_dimensionless(&self) -> bool {
        self.dims.is_dimensionless() && (self.cgs_factor - 1.0).abs() < 1e-12
    }

    pub fn same_dimensions(&self, other: &Unit) -> bool {
        self.dims.approx_eq(&other.dims)
    }

    /// Factor that converts a value in `self` into a value in `target`.
    pub fn conversion_factor(&self, target: &Unit) -> Result<f64> {
        if !self.same_dimensions(target) {
            return Err(Error::UnitMismatch {
                expected: target.expr.clone(),
                found: self.expr.clone(),
            });
        }
        Ok(self.cgs_factor / target.cgs_factor)
    }

    pub fn mul(&self, other: &Unit) -> Unit {
        if self.is_dimensionless() {
            return other.clone();
        }
        if other.is_dimensionless() {
            return self.clone();
        }
        Unit::new(
            format!("{}*{}", self.expr, wrap_compound(&other.expr)),
            self.dims.mul(other.dims),
            self.cgs_factor * other.cgs_factor,
        )
    }

    pub fn div(&self, other: &Unit) -> Unit {
        if other.is_dimensionless() {
            return self.clone();
        }
        let numerator = if self.is_dimensionless() {
            "1".to_string()
        } else {
            self.expr.clone()
        };
        Unit::new(
            format!("{}/{}", numerator, wrap_compound(&other.expr)),
            self.dims.div(other.dims),
            self.cgs_factor / other.cgs_factor,
        )
    }

    pub fn powf(&self, p: f64) -> Unit {
        if self.is_dimensionless() || (p - 1.0).abs() < EXPONENT_EPSILON {
            return self.clone();
        }
        let base = if is_symbol(&self.expr) {
            self.expr.clone()
        } else {
            format!("({})", self.expr)
        };
        Unit::new(
            format_power(&base, p),
            self.dims.powf(p),
            self.cgs_factor.powf(p),
        )
    }
}

fn is_symbol(expr: &str) -> bool {
    expr.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn wrap_compound(expr: &str) -> String {
    if expr.contains('*') || expr.contains('/') {
        format!("({expr})")
    } else {
        expr.to_string()
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.same_dimensions(other)
            && (self.cgs_factor - other.cgs_factor).abs()
                <= 1e-12 * self.cgs_factor.abs().max(other.cgs_factor.abs())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// A scalar value tagged with a unit.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub units: Unit,
}

impl Quantity {
    pub fn new(value: f64, units: Unit) -> Self {
        Self { value, units }
    }

    /// Converts the quantity into `target` units.
    pub fn to(&self, target: &Unit) -> Result<Quantity> {
        let factor = self.units.conversion_factor(target)?;
        Ok(Quantity::new(self.value * factor, target.clone()))
    }

    /// Value expressed in CGS.
    pub fn in_cgs(&self) -> f64 {
        self.value * self.units.cgs_factor
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.units)
    }
}

pub const CM_PER_AU: f64 = 1.495_978_707e13;
pub const CM_PER_PC: f64 = 3.085_677_581_491_367e18;
pub const SECONDS_PER_YEAR: f64 = 3.155_76e7;
pub const MASS_SUN_GRAMS: f64 = 1.988_415_86e33;

/// Symbol table used to parse unit expressions.
#[derive(Clone, Debug)]
pub struct UnitRegistry {
    symbols: HashMap<String, (f64, Dimensions)>,
}

impl UnitRegistry {
    /// Creates a registry with the built-in CGS, SI and astronomical symbols.
    pub fn new() -> Self {
        let mut reg = Self {
            symbols: HashMap::new(),
        };
        let energy = Dimensions::new(1.0, 2.0, -2.0, 0.0);
        let force = Dimensions::new(1.0, 1.0, -2.0, 0.0);
        reg.define("dimensionless", 1.0, Dimensions::NONE)
            .define("g", 1.0, Dimensions::MASS)
            .define("kg", 1.0e3, Dimensions::MASS)
            .define("Msun", MASS_SUN_GRAMS, Dimensions::MASS)
            .define("cm", 1.0, Dimensions::LENGTH)
            .define("m", 1.0e2, Dimensions::LENGTH)
            .define("km", 1.0e5, Dimensions::LENGTH)
            .define("au", CM_PER_AU, Dimensions::LENGTH)
            .define("pc", CM_PER_PC, Dimensions::LENGTH)
            .define("kpc", CM_PER_PC * 1.0e3, Dimensions::LENGTH)
            .define("Mpc", CM_PER_PC * 1.0e6, Dimensions::LENGTH)
            .define("s", 1.0, Dimensions::TIME)
            .define("yr", SECONDS_PER_YEAR, Dimensions::TIME)
            .define("Myr", SECONDS_PER_YEAR * 1.0e6, Dimensions::TIME)
            .define("Gyr", SECONDS_PER_YEAR * 1.0e9, Dimensions::TIME)
            .define("K", 1.0, Dimensions::TEMPERATURE)
            .define("erg", 1.0, energy)
            .define("dyne", 1.0, force);
        reg
    }

    /// Defines (or redefines) a symbol.
    pub fn define(&mut self, symbol: &str, cgs_factor: f64, dims: Dimensions) -> &mut Self {
        self.symbols.insert(symbol.to_string(), (cgs_factor, dims));
        self
    }

    /// Defines `code_length`, `code_mass`, `code_time` and `code_velocity` from CGS scales.
    pub fn define_code_units(&mut self, length_cm: f64, mass_g: f64, time_s: f64) -> &mut Self {
        self.define("code_length", length_cm, Dimensions::LENGTH)
            .define("code_mass", mass_g, Dimensions::MASS)
            .define("code_time", time_s, Dimensions::TIME)
            .define(
                "code_velocity",
                length_cm / time_s,
                Dimensions::new(0.0, 1.0, -1.0, 0.0),
            )
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Parses a unit expression. Empty strings are dimensionless.
    pub fn parse(&self, expr: &str) -> Result<Unit> {
        let normalized = normalize_latex(expr);
        if normalized.is_empty() {
            return Ok(Unit::dimensionless());
        }
        let tokens = tokenize(&normalized).map_err(|reason| Error::UnitParse {
            expr: expr.to_string(),
            reason,
        })?;
        let mut parser = Parser {
            registry: self,
            tokens: &tokens,
            pos: 0,
        };
        let (factor, dims) = parser.expr().map_err(|reason| Error::UnitParse {
            expr: expr.to_string(),
            reason,
        })?;
        if parser.pos != tokens.len() {
            return Err(Error::UnitParse {
                expr: expr.to_string(),
                reason: format!("unexpected trailing input at token {}", parser.pos),
            });
        }
        Ok(Unit::new(normalized, dims, factor))
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_latex(expr: &str) -> String {
    expr.replace("\\mathrm", "")
        .replace("\\rm", "")
        .replace('{', "(")
        .replace('}', ")")
        .replace(' ', "")
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Symbol(String),
    Number(f64),
    Star,
    Slash,
    Pow,
    Minus,
    Open,
    Close,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push(Token::Pow);
                i += 2;
            }
            '*' => {
                out.push(Token::Star);
                i += 1;
            }
            '^' => {
                out.push(Token::Pow);
                i += 1;
            }
            '/' => {
                out.push(Token::Slash);
                i += 1;
            }
            '-' => {
                out.push(Token::Minus);
                i += 1;
            }
            '(' => {
                out.push(Token::Open);
                i += 1;
            }
            ')' => {
                out.push(Token::Close);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || ((chars[i] == 'e' || chars[i] == 'E')
                            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit() || *n == '-')))
                {
                    if chars[i] == 'e' || chars[i] == 'E' {
                        i += 1;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                out.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.push(Token::Symbol(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(out)
}

struct Parser<'a> {
    registry: &'a UnitRegistry,
    tokens: &'a [Token],
    pos: usize,
}

type Parsed = std::result::Result<(f64, Dimensions), String>;

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expr(&mut self) -> Parsed {
        let (mut factor, mut dims) = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    let (f, d) = self.term()?;
                    factor *= f;
                    dims = dims.mul(d);
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let (f, d) = self.term()?;
                    factor /= f;
                    dims = dims.div(d);
                }
                // Juxtaposition such as `(g)(cm)^2` multiplies.
                Some(Token::Open) | Some(Token::Symbol(_)) => {
                    let (f, d) = self.term()?;
                    factor *= f;
                    dims = dims.mul(d);
                }
                _ => return Ok((factor, dims)),
            }
        }
    }

    fn term(&mut self) -> Parsed {
        let (factor, dims) = self.factor()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let p = self.exponent()?;
            return Ok((factor.powf(p), dims.powf(p)));
        }
        Ok((factor, dims))
    }

    fn exponent(&mut self) -> std::result::Result<f64, String> {
        match self.next() {
            Some(Token::Minus) => Ok(-self.exponent()?),
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Open) => {
                let mut value = self.exponent()?;
                if self.peek() == Some(&Token::Slash) {
                    self.pos += 1;
                    let denom = self.exponent()?;
                    if denom == 0.0 {
                        return Err("zero denominator in exponent".into());
                    }
                    value /= denom;
                }
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("unbalanced parentheses in exponent".into()),
                }
            }
            other => Err(format!("expected exponent, found {other:?}")),
        }
    }

    fn factor(&mut self) -> Parsed {
        match self.next() {
            Some(Token::Number(n)) => Ok((n, Dimensions::NONE)),
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err("unbalanced parentheses".into()),
                }
            }
            Some(Token::Symbol(s)) if s == "sqrt" => {
                if self.next() != Some(Token::Open) {
                    return Err("expected '(' after sqrt".into());
                }
                let (f, d) = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok((f.sqrt(), d.powf(0.5))),
                    _ => Err("unbalanced parentheses".into()),
                }
            }
            Some(Token::Symbol(s)) => self
                .registry
                .symbols
                .get(&s)
                .copied()
                .ok_or_else(|| format!("unknown symbol '{s}'")),
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

/// Per-dataset scale factors used by convert functions, keyed by quantity name.
///
/// Frontends register factors such as `Density` or `GasEnergy` that translate raw code
/// values into CGS.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct ConversionFactors {
    factors: HashMap<String, f64>,
}

impl ConversionFactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, factor: f64) -> &mut Self {
        self.factors.insert(name.into(), factor);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.factors.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factors.contains_key(name)
    }

    /// Returns the factor for `name`, failing when the dataset never defined it.
    pub fn convert(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| Error::InvalidData(format!("no conversion factor for '{name}'")))
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-9 * a.abs().max(b.abs()), "{a} != {b}");
    }

    #[test]
    fn parses_density_units() {
        let reg = UnitRegistry::new();
        let unit = reg.parse("g/cm**3").expect("parse succeeds");
        assert!(unit
            .dims()
            .approx_eq(&Dimensions::new(1.0, -3.0, 0.0, 0.0)));
        assert_eq!(unit.cgs_factor(), 1.0);
        assert_eq!(unit.to_string(), "g/cm**3");
    }

    #[test]
    fn parses_latex_units_with_juxtaposition() {
        let reg = UnitRegistry::new();
        let energy = reg.parse(r"\rm{g}\rm{cm}^2/\rm{s}^2").expect("parse succeeds");
        assert!(energy
            .dims()
            .approx_eq(&Dimensions::new(1.0, 2.0, -2.0, 0.0)));

        let pressure = reg.parse(r"\rm{g}/\rm{s}^2/\rm{cm}^1").expect("parse succeeds");
        assert!(pressure
            .dims()
            .approx_eq(&Dimensions::new(1.0, -1.0, -2.0, 0.0)));

        let deposit = reg.parse("1/cm^{3}").expect("parse succeeds");
        assert!(deposit
            .dims()
            .approx_eq(&Dimensions::new(0.0, -3.0, 0.0, 0.0)));
    }

    #[test]
    fn parses_fractional_powers() {
        let reg = UnitRegistry::new();
        let unit = reg.parse("g**2*sqrt(K)/cm**6").expect("parse succeeds");
        assert!(unit
            .dims()
            .approx_eq(&Dimensions::new(2.0, -6.0, 0.0, 0.5)));
        let same = reg.parse("g**2*K**(1/2)/cm**6").expect("parse succeeds");
        assert!(unit.same_dimensions(&same));
    }

    #[test]
    fn empty_expression_is_dimensionless() {
        let reg = UnitRegistry::new();
        assert!(reg.parse("").expect("parse succeeds").is_dimensionless());
        assert!(reg.parse("dimensionless").expect("parse succeeds").is_dimensionless());
    }

    #[test]
    fn unknown_symbols_fail() {
        let reg = UnitRegistry::new();
        let err = reg.parse("furlong/fortnight").expect_err("unknown symbol");
        assert!(matches!(err, Error::UnitParse { .. }));
    }

    #[test]
    fn conversion_factor_between_compatible_units() {
        let reg = UnitRegistry::new();
        let km = reg.parse("km").expect("parse succeeds");
        let cm = reg.parse("cm").expect("parse succeeds");
        approx_eq(km.conversion_factor(&cm).expect("compatible"), 1.0e5);

        let s = reg.parse("s").expect("parse succeeds");
        let err = km.conversion_factor(&s).expect_err("incompatible");
        assert!(matches!(err, Error::UnitMismatch { .. }));
    }

    #[test]
    fn code_units_follow_dataset_scales() {
        let mut reg = UnitRegistry::new();
        reg.define_code_units(CM_PER_PC * 1.0e3, MASS_SUN_GRAMS, SECONDS_PER_YEAR);
        let q = Quantity::new(300.0, reg.parse("kpc").expect("parse succeeds"));
        let code = reg.parse("code_length").expect("parse succeeds");
        approx_eq(q.to(&code).expect("compatible").value, 300.0);
        let v = reg.parse("code_velocity").expect("parse succeeds");
        approx_eq(v.cgs_factor(), CM_PER_PC * 1.0e3 / SECONDS_PER_YEAR);
    }

    #[test]
    fn unit_algebra_simplifies_dimensionless_factors() {
        let reg = UnitRegistry::new();
        let cm = reg.parse("cm").expect("parse succeeds");
        let area = Unit::dimensionless().mul(&cm.powf(2.0));
        assert_eq!(area.to_string(), "cm**2");

        let density = reg.parse("g/cm**3").expect("parse succeeds");
        let mass = density.mul(&cm.powf(3.0));
        assert!(mass.same_dimensions(&reg.parse("g").expect("parse succeeds")));
        assert_eq!(Unit::dimensionless().div(&cm).to_string(), "1/cm");
    }

    #[test]
    fn conversion_factors_report_missing_names() {
        let mut factors = ConversionFactors::new();
        factors.set("Density", 2.0);
        assert_eq!(factors.convert("Density").expect("defined"), 2.0);
        assert!(matches!(
            factors.convert("Pressure"),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn cgs_expression_orders_numerator_and_denominator() {
        let dims = Dimensions::new(1.0, 2.0, -2.0, 0.0);
        assert_eq!(dims.cgs_expr(), "g*cm**2/s**2");
        assert_eq!(Dimensions::NONE.cgs_expr(), "dimensionless");
        assert_eq!(Dimensions::new(0.0, -3.0, 0.0, 0.0).cgs_expr(), "1/cm**3");
    }
}
