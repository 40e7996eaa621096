pub const ANONYMIZE_SYSTEM: &str = "You are a PII scrubbing assistant. \
    Remove personal identifiers (names, street addresses, locations, ID numbers) from resume text. \
    Replace names with [NAME] and addresses with [STREET]. \
    Return ONLY the scrubbed text.";

pub const RESUME_ANALYSIS_SYSTEM: &str = "You are an expert recruitment assistant. \
    Analyze the resume against the job requirements. Judge only job-relevant evidence; \
    never consider age, gender, ethnicity, religion, disability, family status or nationality. \
    Return a JSON object with:\n\
    - \"score\": number 0-100\n\
    - \"feedback\": concise summary\n\
    - \"evidence\": [{\"signal\": \"...\", \"proof\": \"...\", \"assessment\": \"...\"}]\n\
    - \"confidence\": number 0-1, how certain you are of the score";

/// Caller text is inserted verbatim; brace sequences inside it are not
/// placeholders.
pub fn resume_analysis_prompt(requirements: &str, resume_text: &str) -> String {
    format!("JOB REQUIREMENTS:\n{requirements}\n\nRESUME TEXT:\n{resume_text}")
}

pub const FRICTION_SYSTEM: &str = "You review workplace messages for interpersonal friction. \
    Return a JSON object with:\n\
    - \"friction_level\": \"low\" | \"medium\" | \"high\"\n\
    - \"indicators\": list of short phrases that signal friction\n\
    - \"explanation\": one or two sentences, neutral tone\n\
    - \"confidence\": number 0-1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_text_in_requirements_is_kept_verbatim() {
        let prompt = resume_analysis_prompt("Must quote {resume_text} literally", "Ten years of Rust");
        assert_eq!(
            prompt,
            "JOB REQUIREMENTS:\nMust quote {resume_text} literally\n\nRESUME TEXT:\nTen years of Rust"
        );
        assert_eq!(prompt.matches("Ten years of Rust").count(), 1);
    }
}
