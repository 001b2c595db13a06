use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// The stored string doubles as the display-routing marker (`ui_type`).
str_enum!(TestCategory {
    GasBreathTest => "sibo",
    GutMicrobiota => "microbiota",
    FoodSensitivity => "sensibilidad",
});

impl TestCategory {
    pub const ALL: [TestCategory; 3] = [
        TestCategory::GasBreathTest,
        TestCategory::GutMicrobiota,
        TestCategory::FoodSensitivity,
    ];

    /// Human-facing label; also the name of the seeded classification term.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::GasBreathTest => "SIBO",
            Self::GutMicrobiota => "Microbiota intestinal",
            Self::FoodSensitivity => "Sensibilidad alimentaria",
        }
    }

    pub fn ui_type(&self) -> &'static str {
        self.as_str()
    }

    pub fn from_display_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.display_name() == name)
    }
}

str_enum!(LogStatus {
    Created => "created",
    Updated => "updated",
    Error => "error",
});

str_enum!(GasKind {
    H2 => "h2",
    Ch4 => "ch4",
    Co2 => "co2",
});
