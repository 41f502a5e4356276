use std::fmt;

use variantly::Variantly;

use crate::models::color::Color;

/// Typed value attached to a model or mesh as descriptive metadata.
#[derive(Clone, Debug, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    /// Fraction in `[0, 1]`.
    Percent(f64),
    Color(Color),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(text) => write!(f, "{text}"),
            PropertyValue::Integer(value) => write!(f, "{value}"),
            PropertyValue::Number(value) => write!(f, "{value:.2}"),
            PropertyValue::Boolean(value) => write!(f, "{}", if *value { "True" } else { "False" }),
            PropertyValue::Percent(value) => write!(f, "{}%", (value * 100.0).round() as i64),
            PropertyValue::Color(color) => write!(f, "{color}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Property {
            name: name.into(),
            value,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyGroup {
    pub name: String,
    pub properties: Vec<Property>,
}

impl PropertyGroup {
    pub fn new(name: impl Into<String>) -> Self {
        PropertyGroup {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn add_property(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}
