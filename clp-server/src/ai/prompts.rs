//! Built-in prompts and response schemas for the three generation steps
//!
//! Administrators may replace a prompt per step; stored templates use the
//! same `{{token}}` substitutions as the built-ins.

use clp_common::models::PromptKind;
use clp_common::outcomes::{
    course_program_keys, describe, program_institutional_keys, weekly_keys, COURSE_OUTCOMES,
    PROGRAM_OUTCOMES,
};
use serde_json::{json, Map, Value};

pub const SUBJECT_TOKEN: &str = "{{subject_name}}";
pub const COURSE_OUTCOMES_TOKEN: &str = "{{course_outcomes}}";
pub const PROGRAM_OUTCOMES_TOKEN: &str = "{{program_outcomes}}";

const PROGRAM_INSTITUTIONAL_PROMPT: &str = r#"
You are an expert academic planner. Your task is to map the alignment between BSIT Program Outcomes (PO) and Institutional Outcomes (IO) for an IT curriculum.

IMPORTANT INSTRUCTIONS:
1. For each Program Outcome (IT01–IT13) and Institutional Outcome (T, R1, I1, R2, I2, C, H), assign exactly one of these: "✔" or " ".
2. The matrix MUST NOT be uniform (e.g., all "✔" or all " ").
3. Your output MUST be a valid JSON object in the following format:
{
    "IT01_T": "✔" or " ",
    "IT01_R1": "✔" or " ",
    ...
    "IT13_H": "✔" or " "
}
Output ONLY a JSON object with NO other text or markdown.
"#;

const COURSE_PROGRAM_PROMPT: &str = r#"
Given the Course Outcomes (CO) and BSIT Program Outcomes (PO), determine the relationship for each pair.
Course Outcomes: {{course_outcomes}}
Program Outcomes: {{program_outcomes}}

For each combination of CO and PO, assign "E" if it *Enables* the PO, "I" if it *Introduces* it, or " " for no alignment.
Your output MUST be a JSON object with keys like 'L012_IT01' and values of "E", "I", or " ".

Output ONLY a JSON object with NO other text or markdown.
"#;

const WEEKLY_BREAKDOWN_PROMPT: &str = r#"
You are an expert academic planner at the University of La Salette, Inc. for the College of Information Technology.
Generate the complete 18-week Course Outline for the subject: "{{subject_name}}".

You MUST generate a SINGLE, flat JSON object.
This JSON object MUST contain the following 5 distinct keys for EACH of the 18 weeks (total 90 keys).
Each key corresponds to a specific content type for that week.

For single weeks (Weeks 1-9, 12-13, 18), use keys:
- "Wn_LO" (Learning Outcomes for Week n)
- "Wn_TO" (Topic Outline for Week n)
- "Wn_Method" (Methodology for Week n)
- "Wn_Assesment" (Assessment for Week n)
- "Wn_LR" (Learning Resources for Week n)

For COMBINED weeks, you MUST use these EXACT keys:
- "W1011_LO", "W1011_TO", "W1011_Method", "W1011_Assesment", "W1011_LR"
- "W1415_LO", "W1415_TO", "W1415_Method", "W1415_Assesment", "W1415_LR"
- "W1617_LO", "W1617_TO", "W1617_Method", "W1617_Assesment", "W1617_LR"

Every value associated with these keys MUST be a JSON string.
You MUST use "\n" for newlines and "• " for list items where appropriate WITHIN the string value.
DO NOT INCLUDE ANY COMMENTS OR NON-JSON TEXT. All fields MUST be filled with realistic and relevant content.

Additionally, at the end of the JSON object, add a key named "references" with a comprehensive list of all references. Format this list as a single string with distinct categories like "Website", "Textbook", "Journal".

**You MUST STRICTLY follow this format for each week's content:**
- The `Wn_LO` value MUST start with "At the end of the week, students should have the ability to:\n".
- The `Wn_TO` value MUST have the main topic followed by a list of sub-topics, all with bullet points.
- The `Wn_Method` value MUST have a list of bulleted items.
- The `Wn_Assesment` value MUST have a list of bulleted items.
- The `Wn_LR` value MUST have a list of bulleted items, grouped by category like "Textbook", "Website", etc.

**DETAILED EXAMPLE FOR ONE WEEK'S CONTENT:**
- "W1_LO": "At the end of the week, students should have the ability to:\n• Explain the University of La Salette vision, mission, core values, core competencies, institutional objectives and outcomes;\n• Relate BSIT program educational outcomes to the institutional outcomes;"
- "W1_TO": "Course Orientation\n• University’s vision, mission, core values, core competencies, institutional objectives and institutional outcomes\n• BSIT program description\n• Course information"
- "W1_Method": "• Interactive discussion\n• Recitation on the university’s vision, mission, core values, core competencies, institutional objectives and institutional outcomes"
- "W1_Assesment": "• Short quiz about the university policies\n• Writing a reflective essay on the purpose of institutional outcomes in helping students become what they want to become\n• Conceptualize a career plan aligned with BSIT program and core values of ULS"
- "W1_LR": "Student Handbook\nCHED CMO 25, series 2015 “PSG for IT Education”\nCurriculum Guidelines for Baccalaureate Degree Programs in Information Technology (IT2017) of ACM and IEEE-CS\nULS Official Website\nhttps://uls.edu.ph"

Output ONLY a JSON object. Do NOT include any introductory or concluding remarks, explanations, or markdown wrappers.
"#;

/// Built-in prompt for a step
pub fn default_template(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::ProgramInstitutional => PROGRAM_INSTITUTIONAL_PROMPT,
        PromptKind::CourseProgram => COURSE_PROGRAM_PROMPT,
        PromptKind::WeeklyBreakdown => WEEKLY_BREAKDOWN_PROMPT,
    }
}

/// Substitute the subject and outcome tokens
pub fn render(template: &str, subject_name: &str) -> String {
    template
        .replace(SUBJECT_TOKEN, subject_name)
        .replace(COURSE_OUTCOMES_TOKEN, &describe(&COURSE_OUTCOMES))
        .replace(PROGRAM_OUTCOMES_TOKEN, &describe(&PROGRAM_OUTCOMES))
}

/// Strict object schema: every key required, values optionally enumerated
fn object_schema(keys: &[String], values: Option<&[&str]>) -> Value {
    let property = match values {
        Some(allowed) => json!({"type": "STRING", "enum": allowed}),
        None => json!({"type": "STRING"}),
    };
    let properties: Map<String, Value> = keys
        .iter()
        .map(|k| (k.clone(), property.clone()))
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": keys,
    })
}

/// Response schema for a step
pub fn schema(kind: PromptKind) -> Value {
    match kind {
        PromptKind::ProgramInstitutional => {
            object_schema(&program_institutional_keys(), Some(&["✔", " "]))
        }
        PromptKind::CourseProgram => object_schema(&course_program_keys(), Some(&["E", "I", " "])),
        PromptKind::WeeklyBreakdown => object_schema(&weekly_keys(), None),
    }
}
