//! Engine option descriptors.
//!
//! Each option carries a UCI type tag, its current and default values, and
//! the domain constraints for that type. Setting a value outside the
//! domain is rejected and leaves the previous value unchanged.

use std::collections::BTreeSet;

/// UCI option type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Trigger with no value.
    Button,
    /// Value must be "true" or "false".
    Checkbox,
    /// Value must be one of a predefined set.
    Combo,
    /// Value must be an integer between min and max.
    Spin,
    /// Value may be any string.
    String,
}

impl OptionKind {
    /// The UCI wire name of this option type.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            OptionKind::Button => "button",
            OptionKind::Checkbox => "check",
            OptionKind::Combo => "combo",
            OptionKind::Spin => "spin",
            OptionKind::String => "string",
        }
    }

    /// Parse a UCI wire name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<OptionKind> {
        let kinds = [
            OptionKind::Button,
            OptionKind::Checkbox,
            OptionKind::Combo,
            OptionKind::Spin,
            OptionKind::String,
        ];
        kinds
            .into_iter()
            .find(|k| k.type_name().eq_ignore_ascii_case(name))
    }
}

/// One engine option: name, type, current value, and domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOption {
    name: String,
    kind: OptionKind,
    value: String,
    default: String,
    min: i64,
    max: i64,
    combo: BTreeSet<String>,
}

impl EngineOption {
    /// A free-form string option.
    #[must_use]
    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        let default = default.into();
        EngineOption {
            name: name.into(),
            kind: OptionKind::String,
            value: default.clone(),
            default,
            min: i64::MIN,
            max: i64::MAX,
            combo: BTreeSet::new(),
        }
    }

    /// An integer option constrained to `min..=max`.
    #[must_use]
    pub fn spin(name: impl Into<String>, default: i64, min: i64, max: i64) -> Self {
        EngineOption {
            name: name.into(),
            kind: OptionKind::Spin,
            value: default.to_string(),
            default: default.to_string(),
            min,
            max,
            combo: BTreeSet::new(),
        }
    }

    /// A boolean option.
    #[must_use]
    pub fn checkbox(name: impl Into<String>, default: bool) -> Self {
        let default = default.to_string();
        EngineOption {
            name: name.into(),
            kind: OptionKind::Checkbox,
            value: default.clone(),
            default,
            min: i64::MIN,
            max: i64::MAX,
            combo: BTreeSet::new(),
        }
    }

    /// An enumerated option whose value must be one of `values`.
    #[must_use]
    pub fn combo(
        name: impl Into<String>,
        default: impl Into<String>,
        values: impl IntoIterator<Item = String>,
    ) -> Self {
        let default = default.into();
        EngineOption {
            name: name.into(),
            kind: OptionKind::Combo,
            value: default.clone(),
            default,
            min: i64::MIN,
            max: i64::MAX,
            combo: values.into_iter().collect(),
        }
    }

    /// A valueless trigger option.
    #[must_use]
    pub fn button(name: impl Into<String>) -> Self {
        EngineOption {
            name: name.into(),
            kind: OptionKind::Button,
            value: String::new(),
            default: String::new(),
            min: i64::MIN,
            max: i64::MAX,
            combo: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The current value parsed as an integer, 0 if not a number.
    #[must_use]
    pub fn int_value(&self) -> i64 {
        self.value.parse().unwrap_or(0)
    }

    #[must_use]
    pub fn default_value(&self) -> &str {
        &self.default
    }

    /// Minimum legal value, `i64::MIN` when unbounded.
    #[must_use]
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Maximum legal value, `i64::MAX` when unbounded.
    #[must_use]
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Legal values for combo options, empty for other kinds.
    #[must_use]
    pub fn combo_values(&self) -> &BTreeSet<String> {
        &self.combo
    }

    /// Set the current value, validating it against the option's domain.
    ///
    /// Returns false and leaves the prior value unchanged on rejection.
    /// Button options never accept a value; their effect is the engine's
    /// business when `set_option` is forwarded.
    pub fn set_value(&mut self, value: &str) -> bool {
        match self.kind {
            OptionKind::Checkbox => {
                if !value.eq_ignore_ascii_case("true") && !value.eq_ignore_ascii_case("false") {
                    return false;
                }
            }
            OptionKind::Combo => {
                if !self.combo.contains(value) {
                    return false;
                }
            }
            OptionKind::Spin => {
                let Ok(parsed) = value.parse::<i64>() else {
                    return false;
                };
                if parsed < self.min || parsed > self.max {
                    return false;
                }
            }
            OptionKind::String => {}
            OptionKind::Button => return false,
        }
        self.value = value.to_string();
        true
    }

    pub fn set_int_value(&mut self, value: i64) -> bool {
        self.set_value(&value.to_string())
    }
}
