//! Tool definitions advertised to the model

use crate::llm::ToolDefinition;
use serde_json::json;

pub const FETCH_STRUCTURE: &str = "fetch_structure";
pub const GET_STRUCTURE_INFO: &str = "get_structure_info";
pub const SUBMIT_DESIGN_JOB: &str = "submit_design_job";
pub const CHECK_JOB_STATUS: &str = "check_job_status";
pub const GET_JOB_RESULTS: &str = "get_job_results";
pub const VISUALIZE_STRUCTURE: &str = "visualize_structure";

pub const VISUALIZATION_STYLES: &[&str] = &["cartoon", "surface", "stick", "cartoon+surface"];
pub const COLOR_SCHEMES: &[&str] = &["chain", "spectrum", "secondary_structure"];

fn tool(name: &str, description: &str, input_schema: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Every tool the dispatcher can execute, in the order shown to the model
pub fn all() -> Vec<ToolDefinition> {
    vec![
        tool(
            FETCH_STRUCTURE,
            "Fetch a structure from the RCSB Protein Data Bank by its 4-character PDB ID. \
             Returns a file_id for use with the other tools.",
            json!({
                "type": "object",
                "properties": {
                    "pdb_id": {
                        "type": "string",
                        "description": "4-character RCSB PDB ID (e.g. '6AL5', '1BRS')"
                    }
                },
                "required": ["pdb_id"]
            }),
        ),
        tool(
            GET_STRUCTURE_INFO,
            "Get chains, residue ranges, contiguous segments and a sequence preview \
             for a structure file.",
            json!({
                "type": "object",
                "properties": {
                    "file_id": {
                        "type": "string",
                        "description": "The file_id of the structure to analyze"
                    }
                },
                "required": ["file_id"]
            }),
        ),
        tool(
            SUBMIT_DESIGN_JOB,
            "Submit a binder design job. IMPORTANT: input_file_id must be the file_id \
             returned by fetch_structure, NOT the 4-character PDB ID. The job runs in \
             the background; its status can be checked later.",
            json!({
                "type": "object",
                "properties": {
                    "input_file_id": {
                        "type": "string",
                        "description": "The file_id returned from fetch_structure"
                    },
                    "contig_spec": {
                        "type": "string",
                        "description": "Contig string defining fixed and generated regions, e.g. 'A1-150/0 70-100'"
                    },
                    "num_designs": {
                        "type": "integer",
                        "description": "Number of designs to generate (1-10)",
                        "default": 1
                    },
                    "diffusion_steps": {
                        "type": "integer",
                        "description": "Number of diffusion timesteps (1-500)",
                        "default": 50
                    },
                    "hotspots": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Optional hotspot residues, e.g. ['A30', 'A33']"
                    }
                },
                "required": ["input_file_id", "contig_spec"]
            }),
        ),
        tool(
            CHECK_JOB_STATUS,
            "Check the current status and progress of a design job.",
            json!({
                "type": "object",
                "properties": {
                    "job_id": {
                        "type": "string",
                        "description": "The job_id returned from submit_design_job"
                    }
                },
                "required": ["job_id"]
            }),
        ),
        tool(
            GET_JOB_RESULTS,
            "Get the output structure files of a completed design job.",
            json!({
                "type": "object",
                "properties": {
                    "job_id": {
                        "type": "string",
                        "description": "The job_id of a completed job"
                    }
                },
                "required": ["job_id"]
            }),
        ),
        tool(
            VISUALIZE_STRUCTURE,
            "Render a 3D view of one or more structures. Returns the file contents \
             for the viewer.",
            json!({
                "type": "object",
                "properties": {
                    "file_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "File ids to visualize"
                    },
                    "style": {
                        "type": "string",
                        "enum": VISUALIZATION_STYLES,
                        "default": "cartoon"
                    },
                    "color_by": {
                        "type": "string",
                        "enum": COLOR_SCHEMES,
                        "default": "chain"
                    },
                    "label": {
                        "type": "string",
                        "description": "Optional label for the view"
                    }
                },
                "required": ["file_ids"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_are_unique_objects() {
        let defs = all();
        assert_eq!(defs.len(), 6);

        let mut names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);

        for def in &defs {
            assert_eq!(def.input_schema["type"], "object");
            assert!(def.input_schema["required"].is_array());
        }
    }
}
