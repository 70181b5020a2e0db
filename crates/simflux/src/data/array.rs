//! Unit-tagged value arrays returned by field evaluation.
use crate::error::{Error, Result};
use crate::units::{Quantity, Unit};

/// A flat array of values with attached units.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldArray {
    pub values: Vec<f64>,
    pub units: Unit,
}

impl FieldArray {
    pub fn new(values: Vec<f64>, units: Unit) -> Self {
        Self { values, units }
    }

    pub fn dimensionless(values: Vec<f64>) -> Self {
        Self::new(values, Unit::dimensionless())
    }

    /// An array of `len` copies of `value`.
    pub fn filled(len: usize, value: f64, units: Unit) -> Self {
        Self::new(vec![value; len], units)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }

    /// Element `i` as a [`Quantity`].
    pub fn quantity(&self, i: usize) -> Option<Quantity> {
        self.values
            .get(i)
            .map(|v| Quantity::new(*v, self.units.clone()))
    }

    /// Minimum and maximum over finite values.
    pub fn extrema(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Replaces the unit label without touching the values.
    pub fn with_units(mut self, units: Unit) -> Self {
        self.units = units;
        self
    }

    /// Converts the values into `target` units.
    pub fn to(&self, target: &Unit) -> Result<FieldArray> {
        let factor = self.units.conversion_factor(target)?;
        Ok(FieldArray::new(
            self.values.iter().map(|v| v * factor).collect(),
            target.clone(),
        ))
    }

    /// Multiplies every value by a plain factor, keeping the units.
    pub fn scale(&self, factor: f64) -> FieldArray {
        self.map(|v| v * factor)
    }

    /// Applies `f` elementwise, keeping the units.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> FieldArray {
        FieldArray::new(self.values.iter().map(|v| f(*v)).collect(), self.units.clone())
    }

    pub fn powf(&self, p: f64) -> FieldArray {
        FieldArray::new(
            self.values.iter().map(|v| v.powf(p)).collect(),
            self.units.powf(p),
        )
    }

    pub fn sqrt(&self) -> FieldArray {
        self.powf(0.5)
    }

    pub fn mul(&self, other: &FieldArray) -> Result<FieldArray> {
        let values = zip_values(self, other, |a, b| a * b)?;
        Ok(FieldArray::new(values, self.units.mul(&other.units)))
    }

    pub fn div(&self, other: &FieldArray) -> Result<FieldArray> {
        let values = zip_values(self, other, |a, b| a / b)?;
        Ok(FieldArray::new(values, self.units.div(&other.units)))
    }

    /// Adds `other` after converting it into this array's units.
    pub fn add(&self, other: &FieldArray) -> Result<FieldArray> {
        let rhs = other.to(&self.units)?;
        let values = zip_values(self, &rhs, |a, b| a + b)?;
        Ok(FieldArray::new(values, self.units.clone()))
    }

    /// Subtracts `other` after converting it into this array's units.
    pub fn sub(&self, other: &FieldArray) -> Result<FieldArray> {
        let rhs = other.to(&self.units)?;
        let values = zip_values(self, &rhs, |a, b| a - b)?;
        Ok(FieldArray::new(values, self.units.clone()))
    }

    /// Keeps the entries where `mask` is true.
    pub fn select(&self, mask: &[bool]) -> FieldArray {
        let values = self
            .values
            .iter()
            .zip(mask)
            .filter_map(|(v, keep)| keep.then_some(*v))
            .collect();
        FieldArray::new(values, self.units.clone())
    }

    /// Concatenates arrays sharing a unit. An empty input yields an empty array in `units`.
    pub fn concat<'a>(
        parts: impl IntoIterator<Item = &'a FieldArray>,
        units: &Unit,
    ) -> Result<FieldArray> {
        let mut values = Vec::new();
        for part in parts {
            let converted = part.to(units)?;
            values.extend(converted.values);
        }
        Ok(FieldArray::new(values, units.clone()))
    }
}

fn zip_values(
    a: &FieldArray,
    b: &FieldArray,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Vec<f64>> {
    if a.len() != b.len() {
        return Err(Error::InvalidData(format!(
            "array length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.values
        .iter()
        .zip(&b.values)
        .map(|(x, y)| op(*x, *y))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitRegistry;

    #[test]
    fn mul_and_div_combine_units() {
        let reg = UnitRegistry::new();
        let rho = FieldArray::new(vec![2.0, 4.0], reg.parse("g/cm**3").unwrap());
        let vol = FieldArray::new(vec![0.5, 0.25], reg.parse("cm**3").unwrap());
        let mass = rho.mul(&vol).expect("same length");
        assert_eq!(mass.values, vec![1.0, 1.0]);
        assert!(mass.units.same_dimensions(&reg.parse("g").unwrap()));

        let back = mass.div(&vol).expect("same length");
        assert!(back.units.same_dimensions(&rho.units));
    }

    #[test]
    fn add_converts_compatible_units() {
        let reg = UnitRegistry::new();
        let a = FieldArray::new(vec![1.0], reg.parse("km").unwrap());
        let b = FieldArray::new(vec![50_000.0], reg.parse("cm").unwrap());
        let sum = a.add(&b).expect("compatible units");
        assert!((sum.values[0] - 1.5).abs() < 1e-12);

        let t = FieldArray::new(vec![1.0], reg.parse("s").unwrap());
        assert!(matches!(a.add(&t), Err(Error::UnitMismatch { .. })));
    }

    #[test]
    fn length_mismatch_is_invalid_data() {
        let a = FieldArray::dimensionless(vec![1.0, 2.0]);
        let b = FieldArray::dimensionless(vec![1.0]);
        assert!(matches!(a.mul(&b), Err(Error::InvalidData(_))));
    }

    #[test]
    fn extrema_skips_non_finite_values() {
        let a = FieldArray::dimensionless(vec![f64::NAN, 3.0, -1.0, f64::INFINITY]);
        assert_eq!(a.extrema(), Some((-1.0, 3.0)));
        assert_eq!(FieldArray::dimensionless(Vec::new()).extrema(), None);
    }

    #[test]
    fn select_applies_mask() {
        let a = FieldArray::dimensionless(vec![1.0, 2.0, 3.0]);
        assert_eq!(a.select(&[true, false, true]).values, vec![1.0, 3.0]);
    }
}
