//! Static outcome tables for the BSIT curriculum
//!
//! These drive the AI response schemas (matrix keys) and the Dean's review
//! view.

use serde::Serialize;

/// One coded outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub code: &'static str,
    pub description: &'static str,
}

pub const PROGRAM_OUTCOMES: [Outcome; 13] = [
    Outcome { code: "IT01", description: "Apply knowledge of computing, science and mathematics appropriate to the discipline" },
    Outcome { code: "IT02", description: "Understand best practices and standards and their applications" },
    Outcome { code: "IT03", description: "Analyze complex problems, and identify and define the computing requirements appropriate to its solution" },
    Outcome { code: "IT04", description: "Identify and analyze user needs and take them into account in the selection, creation, evaluation and administration of computer-based systems" },
    Outcome { code: "IT05", description: "Design, implement and evaluate computer-based systems, processes, components or programs to meet desired needs and requirements under various constraints" },
    Outcome { code: "IT06", description: "Integrate IT-based solutions into the user environment effectively" },
    Outcome { code: "IT07", description: "Apply knowledge through the use of current techniques, skills, tools and practices necessary for the IT profession" },
    Outcome { code: "IT08", description: "Function effectively as a member or leader of a development team recognizing the different roles within a team to accomplish a common goal" },
    Outcome { code: "IT09", description: "Assist in the creation of an effective IT project plan" },
    Outcome { code: "IT10", description: "Communicate effectively with the computing community and with society at large about complex computing activities through logical writing, presentations and clear instructions" },
    Outcome { code: "IT11", description: "Analyze the local and global impact of computing information technology on individuals, organizations and society" },
    Outcome { code: "IT12", description: "Understand professional, ethical, legal, security and social issues and responsibilities in the utilization of information technology." },
    Outcome { code: "IT13", description: "Recognize the need for and engage in planning self-learning and improving performance as a foundation for continuing professional development" },
];

pub const COURSE_OUTCOMES: [Outcome; 1] = [
    Outcome { code: "L012", description: "Analyze different user populations with regard to their abilities and characteristics for using both software and hardware products, and Evaluate the design of existing user interfaces based on the cognitive models of target user" },
];

pub const INSTITUTIONAL_OUTCOME_HEADERS: [&str; 7] = ["T", "R1", "I1", "R2", "I2", "C", "H"];

/// Weeks with their own rows in the course outline; 10-11, 14-15 and 16-17
/// share combined rows
pub const WEEK_PREFIXES: [&str; 15] = [
    "W1", "W2", "W3", "W4", "W5", "W6", "W7", "W8", "W9", "W12", "W13", "W18", "W1011", "W1415",
    "W1617",
];

/// Per-week content columns (the template spells "Assesment" this way)
pub const WEEK_SUFFIXES: [&str; 5] = ["_LO", "_TO", "_Method", "_Assesment", "_LR"];

/// Key for the consolidated reference list
pub const REFERENCES_KEY: &str = "references";

/// Program codes (`IT01`..`IT13`)
pub fn program_outcome_headers() -> impl Iterator<Item = &'static str> {
    PROGRAM_OUTCOMES.iter().map(|o| o.code)
}

/// `IT01_T` .. `IT13_H`
pub fn program_institutional_keys() -> Vec<String> {
    program_outcome_headers()
        .flat_map(|po| {
            INSTITUTIONAL_OUTCOME_HEADERS
                .iter()
                .map(move |io| format!("{}_{}", po, io))
        })
        .collect()
}

/// `L012_IT01` .. for every course outcome
pub fn course_program_keys() -> Vec<String> {
    COURSE_OUTCOMES
        .iter()
        .flat_map(|co| program_outcome_headers().map(move |po| format!("{}_{}", co.code, po)))
        .collect()
}

/// Every weekly-breakdown key, followed by `references`
pub fn weekly_keys() -> Vec<String> {
    let mut keys: Vec<String> = WEEK_PREFIXES
        .iter()
        .flat_map(|w| WEEK_SUFFIXES.iter().map(move |s| format!("{}{}", w, s)))
        .collect();
    keys.push(REFERENCES_KEY.to_string());
    keys
}

/// "CODE: description, CODE: description"
pub fn describe(outcomes: &[Outcome]) -> String {
    outcomes
        .iter()
        .map(|o| format!("{}: {}", o.code, o.description))
        .collect::<Vec<_>>()
        .join(", ")
}
