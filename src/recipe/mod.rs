//! Declarative recipes and the catalog that holds them.

pub mod catalog;
pub mod schema;

pub use catalog::{load_builtin_documents, RecipeCatalog};
pub use schema::{
    infer_kind, BuildSystem, ChoiceSpec, CommandSpec, CommandStepSpec, Condition, ConfigFormat,
    ConfigRecipe, ConfigTemplate, ConstraintKind, DataPackRecipe, FailureCategory, FailureHandler,
    InputCondition, InputKind, InputSpec, InstallSpec, InstallVariant, MethodCommands,
    OptionRequires, OptionSpec, Recipe, RecipeBase, RemediationSpec, Requires, RestartScope,
    SourceSpec, Strategy, ToolRecipe, VersionChoiceSpec, VersionConstraint, VersionOption,
};
