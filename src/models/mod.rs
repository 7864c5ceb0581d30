//! Resource types reconciled by this crate

mod template_version;

pub use template_version::{
    TemplateVersion, TemplateVersionSpec, TemplateVersionStatus, GROUP, KIND, PLURAL, VERSION,
};
