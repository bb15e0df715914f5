// ==========================================
// Dental Lab Flow - Workflow Template Catalog
// ==========================================
// Read-only after initialization. Compiled-in defaults cover every
// procedure type; a JSON file can replace them at startup (the file
// carries real material ids for default deductions, which the
// compiled defaults cannot know).
// ==========================================

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::domain::template::{StepDefinition, WorkflowTemplate};
use crate::domain::types::ProcedureType;

/// Catalog load/lookup errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("no template registered for procedure type {0}")]
    TemplateNotFound(ProcedureType),

    #[error("failed to read template file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse template file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("template file defines no templates")]
    EmptyFile,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    templates: Vec<WorkflowTemplate>,
}

// ==========================================
// TemplateCatalog
// ==========================================
pub struct TemplateCatalog {
    templates: HashMap<ProcedureType, WorkflowTemplate>,
}

impl TemplateCatalog {
    /// Catalog with the compiled-in default templates
    pub fn with_defaults() -> Self {
        let mut templates = HashMap::new();
        for procedure in ProcedureType::all() {
            templates.insert(procedure, default_template(procedure));
        }
        Self { templates }
    }

    /// Load templates from a JSON file, replacing defaults for the
    /// procedure types it defines.
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let file: TemplateFile = serde_json::from_str(&raw)?;
        if file.templates.is_empty() {
            return Err(CatalogError::EmptyFile);
        }

        let mut catalog = Self::with_defaults();
        for template in file.templates {
            catalog.templates.insert(template.procedure_type, template);
        }
        Ok(catalog)
    }

    /// Build from an explicit template list (tests, embedded configs)
    pub fn from_templates(templates: Vec<WorkflowTemplate>) -> Self {
        let mut map = HashMap::new();
        for template in templates {
            map.insert(template.procedure_type, template);
        }
        Self { templates: map }
    }

    /// Look up the template for a procedure type
    pub fn get(&self, procedure: ProcedureType) -> Result<&WorkflowTemplate, CatalogError> {
        self.templates
            .get(&procedure)
            .ok_or(CatalogError::TemplateNotFound(procedure))
    }

    /// Look up a template by id (instances record the template id)
    pub fn get_by_id(&self, template_id: &str) -> Option<&WorkflowTemplate> {
        self.templates.values().find(|t| t.id == template_id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn step(step_type: &str, responsible: &str, hours: u32) -> StepDefinition {
    StepDefinition {
        step_type: step_type.to_string(),
        default_responsible: responsible.to_string(),
        estimated_duration_hours: hours,
        default_materials: Vec::new(),
    }
}

/// Canonical step orderings per procedure type.
/// Default materials are deployment-specific (they reference inventory
/// ids), so the compiled defaults carry none; the JSON override file
/// is where real deployments attach them.
fn default_template(procedure: ProcedureType) -> WorkflowTemplate {
    let (name, steps) = match procedure {
        ProcedureType::TotalProsthesis => (
            "Total prosthesis",
            vec![
                step("MODEL_CASTING", "TECHNICIAN", 4),
                step("BASE_PLATE", "TECHNICIAN", 3),
                step("TEETH_SETUP", "TECHNICIAN", 6),
                step("WAX_TRY_IN", "TECHNICIAN", 2),
                step("ACRYLIZATION", "TECHNICIAN", 8),
                step("FINISHING_POLISHING", "FINISHER", 3),
            ],
        ),
        ProcedureType::PartialProsthesis => (
            "Partial removable prosthesis",
            vec![
                step("MODEL_CASTING", "TECHNICIAN", 4),
                step("FRAMEWORK_CASTING", "CASTING_TECHNICIAN", 8),
                step("TEETH_SETUP", "TECHNICIAN", 6),
                step("ACRYLIZATION", "TECHNICIAN", 8),
                step("FINISHING_POLISHING", "FINISHER", 3),
            ],
        ),
        ProcedureType::FixedProsthesis => (
            "Fixed prosthesis",
            vec![
                step("MODEL_CASTING", "TECHNICIAN", 4),
                step("DIE_PREPARATION", "TECHNICIAN", 3),
                step("COPING_FABRICATION", "CASTING_TECHNICIAN", 6),
                step("CERAMIC_APPLICATION", "CERAMIST", 8),
                step("GLAZING", "CERAMIST", 2),
            ],
        ),
        ProcedureType::ImplantProtocol => (
            "Implant protocol prosthesis",
            vec![
                step("MODEL_CASTING", "TECHNICIAN", 4),
                step("BAR_MILLING", "CAD_CAM_OPERATOR", 10),
                step("TEETH_SETUP", "TECHNICIAN", 6),
                step("ACRYLIZATION", "TECHNICIAN", 8),
                step("FINISHING_POLISHING", "FINISHER", 3),
            ],
        ),
        ProcedureType::OrthodonticAppliance => (
            "Orthodontic appliance",
            vec![
                step("MODEL_CASTING", "TECHNICIAN", 3),
                step("WIRE_BENDING", "TECHNICIAN", 4),
                step("ACRYLIZATION", "TECHNICIAN", 6),
                step("FINISHING_POLISHING", "FINISHER", 2),
            ],
        ),
    };

    WorkflowTemplate {
        // Stable across restarts so instances persisted with this id
        // still resolve after the process is rebuilt.
        id: format!("builtin-{}", procedure.as_str().to_lowercase()),
        name: name.to_string(),
        procedure_type: procedure,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_procedure() {
        let catalog = TemplateCatalog::with_defaults();
        for procedure in ProcedureType::all() {
            let template = catalog.get(procedure).unwrap();
            assert!(!template.steps.is_empty());
            assert_eq!(template.procedure_type, procedure);
        }
    }

    #[test]
    fn test_total_prosthesis_is_six_steps() {
        let catalog = TemplateCatalog::with_defaults();
        let template = catalog.get(ProcedureType::TotalProsthesis).unwrap();
        assert_eq!(template.step_count(), 6);
        assert_eq!(template.steps[0].step_type, "MODEL_CASTING");
        assert_eq!(template.steps[5].step_type, "FINISHING_POLISHING");
    }

    #[test]
    fn test_builtin_ids_survive_rebuild() {
        let first = TemplateCatalog::with_defaults();
        let second = TemplateCatalog::with_defaults();
        for procedure in ProcedureType::all() {
            let id = first.get(procedure).unwrap().id.clone();
            assert_eq!(id, second.get(procedure).unwrap().id);
            assert_eq!(
                second.get_by_id(&id).unwrap().procedure_type,
                procedure
            );
        }
    }

    #[test]
    fn test_from_templates_overrides_lookup() {
        let mut template = default_template(ProcedureType::FixedProsthesis);
        template.name = "Custom fixed".to_string();
        let catalog = TemplateCatalog::from_templates(vec![template]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.get(ProcedureType::FixedProsthesis).unwrap().name,
            "Custom fixed"
        );
        assert!(catalog.get(ProcedureType::TotalProsthesis).is_err());
    }
}
