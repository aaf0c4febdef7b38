//! Prompt templates sent to the chat model.

use crate::index::SearchResult;

pub(crate) const SUMMARY_SYSTEM_PROMPT: &str = "You are a medical assistant. Summarize the following medical note, highlighting key patient information, diagnoses, and treatment plans.";

pub(crate) const ANSWER_SYSTEM_PROMPT: &str = "You are a medical assistant answering questions about patient records. Answer using only the information in the provided context documents. If the context does not contain the answer, say that you cannot answer from the available documents.";

pub(crate) const EXTRACTION_SYSTEM_PROMPT: &str = "You extract structured data from medical notes. Respond with a single JSON object that follows the requested structure exactly. Use empty strings or empty lists for missing information.";

const EXTRACTION_SCHEMA: &str = r#"{
    "patient_info": {
        "name": "string",
        "age": "string",
        "gender": "string",
        "dob": "string (YYYY-MM-DD)"
    },
    "conditions": [
        {
            "condition": "string",
            "status": "string (active/resolved)",
            "onset_date": "string (YYYY-MM-DD)"
        }
    ],
    "medications": [
        {
            "name": "string",
            "dosage": "string",
            "frequency": "string",
            "start_date": "string (YYYY-MM-DD)"
        }
    ],
    "procedures": [
        {
            "name": "string",
            "date": "string (YYYY-MM-DD)",
            "provider": "string"
        }
    ],
    "allergies": ["string"],
    "vitals": {
        "blood_pressure": "string",
        "heart_rate": "string",
        "temperature": "string",
        "weight": "string",
        "height": "string"
    },
    "lab_results": [
        {
            "test_name": "string",
            "value": "string",
            "unit": "string",
            "reference_range": "string",
            "date": "string (YYYY-MM-DD)"
        }
    ]
}"#;

/// Build the user message for question answering: a numbered context block followed by the question.
pub(crate) fn build_answer_prompt(question: &str, context: &[SearchResult]) -> String {
    let mut prompt = String::from("Context documents:\n\n");
    for (position, document) in context.iter().enumerate() {
        prompt.push_str(&format!(
            "Document {}: {}\n{}\n\n",
            position + 1,
            document.title.trim(),
            document.content.trim()
        ));
    }
    prompt.push_str(&format!("Question: {}\n", question.trim()));
    prompt.push_str("Answer based only on the context documents above.");
    prompt
}

/// Build the extraction prompt embedding the JSON schema and the note.
pub fn build_extraction_prompt(title: &str, content: &str) -> String {
    format!(
        "Extract structured data from the following medical note. Return the data in JSON format with the following structure:\n{EXTRACTION_SCHEMA}\n\nMedical Note:\nTitle: {title}\nContent: {content}\n"
    )
}
