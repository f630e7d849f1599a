//! CLI value enums and domain type conversions.

use clap::ValueEnum;

use crate::domain::RelationshipType;

/// Relationship type for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum RelationshipTypeArg {
    /// Source is derived from target
    #[value(alias = "derives-from")]
    DerivesFrom,
    /// Source adds detail to target
    Refines,
    /// Source realizes target
    Implements,
    /// Source verifies target
    Tests,
    /// Source cannot be satisfied without target
    #[value(alias = "depends-on")]
    DependsOn,
    /// Source and target cannot both hold
    #[value(alias = "conflicts-with")]
    ConflictsWith,
    /// Source and target reinforce each other
    Supports,
    /// Source supersedes target
    Replaces,
}

impl From<RelationshipTypeArg> for RelationshipType {
    fn from(arg: RelationshipTypeArg) -> Self {
        match arg {
            RelationshipTypeArg::DerivesFrom => RelationshipType::DerivesFrom,
            RelationshipTypeArg::Refines => RelationshipType::Refines,
            RelationshipTypeArg::Implements => RelationshipType::Implements,
            RelationshipTypeArg::Tests => RelationshipType::Tests,
            RelationshipTypeArg::DependsOn => RelationshipType::DependsOn,
            RelationshipTypeArg::ConflictsWith => RelationshipType::ConflictsWith,
            RelationshipTypeArg::Supports => RelationshipType::Supports,
            RelationshipTypeArg::Replaces => RelationshipType::Replaces,
        }
    }
}

impl std::fmt::Display for RelationshipTypeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        RelationshipType::from(*self).fmt(f)
    }
}
