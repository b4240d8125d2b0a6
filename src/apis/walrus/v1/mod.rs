//! # walrus.seal.io/v1
//!
//! Virtual resources served by the extension API server.
//!
//! | Kind | Backed by |
//! |------|-----------|
//! | `Project` | a Namespace labelled `projects` |
//! | `Environment` | a Namespace labelled `environments`, controlled by its Project |
//! | `ProjectSubjects` | ClusterRoleBindings labelled `rolebindings` |
//! | `Setting` | one key of the `walrus-settings` Secret |
//! | `Variable` | one key of a `walrus-variables` Secret |
//! | `FileExample`, `TemplateCompletionExample` | static content |
//! | `Catalog`, `Connector`, `Resource`, ... | the walruscore resource of the same kind |

mod environment;
mod examples;
mod project;
mod project_subjects;
mod proxied;
mod setting;
mod variable;

pub use environment::{Environment, EnvironmentSpec, EnvironmentStatus, EnvironmentType};
pub use examples::{
    FileExample, FileExampleSpec, FileExampleStatus, TemplateCompletionExample,
    TemplateCompletionExampleSpec, TemplateCompletionExampleStatus,
};
pub use project::{Project, ProjectSpec, ProjectStatus};
pub use project_subjects::{ProjectSubject, ProjectSubjectRole, ProjectSubjects};
pub use proxied::{Catalog, Connector, Resource, ResourceDefinition, ResourceRun, Template};
pub use setting::{Setting, SettingSpec, SettingStatus};
pub use variable::{Variable, VariableSpec, VariableStatus};
