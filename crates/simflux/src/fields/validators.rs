//! Preconditions checked before a field is evaluated.
use crate::data::DataContainer;
use crate::fields::FieldKey;

/// A precondition attached to a field descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validator {
    /// The named raw fields must exist in the data source. An empty list names the field
    /// being validated.
    DataField(Vec<String>),
    /// The named container parameters must be set.
    Parameter(Vec<String>),
    /// The named dataset properties must be known.
    Property(Vec<String>),
    /// The field must be evaluated on whole patches, optionally with ghost zones.
    Spatial { ghost_zones: usize },
    /// The field needs grid (patch) data rather than a flat selection.
    GridType,
}

impl Validator {
    pub fn data_field(name: impl Into<String>) -> Self {
        Validator::DataField(vec![name.into()])
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Validator::Parameter(vec![name.into()])
    }

    pub fn property(name: impl Into<String>) -> Self {
        Validator::Property(vec![name.into()])
    }

    pub fn spatial(ghost_zones: usize) -> Self {
        Validator::Spatial { ghost_zones }
    }

    /// Checks the precondition for evaluating `key` within `container`.
    ///
    /// Returns a human readable reason on failure.
    pub fn check(
        &self,
        container: &DataContainer<'_>,
        key: &FieldKey,
    ) -> std::result::Result<(), String> {
        let dataset = container.dataset();
        match self {
            Validator::DataField(names) => {
                let own = [key.name.clone()];
                let names = if names.is_empty() { &own[..] } else { &names[..] };
                for name in names {
                    let raw = match &key.ptype {
                        Some(ptype) => FieldKey::particle(ptype.clone(), name.clone()),
                        None => FieldKey::new(name.clone()),
                    };
                    if !dataset.has_raw_field(&raw) {
                        return Err(format!("raw field '{raw}' is not in the data source"));
                    }
                }
                Ok(())
            }
            Validator::Parameter(names) => match names
                .iter()
                .find(|name| container.field_parameter(name).is_none())
            {
                Some(missing) => Err(format!("parameter '{missing}' is not set")),
                None => Ok(()),
            },
            Validator::Property(names) => match names
                .iter()
                .find(|name| dataset.property(name).is_none())
            {
                Some(missing) => Err(format!("dataset property '{missing}' is unknown")),
                None => Ok(()),
            },
            Validator::Spatial { ghost_zones } => {
                if *ghost_zones > 0 {
                    Err(format!(
                        "{ghost_zones} ghost zones requested but patches carry none"
                    ))
                } else {
                    Ok(())
                }
            }
            Validator::GridType => Ok(()),
        }
    }
}
