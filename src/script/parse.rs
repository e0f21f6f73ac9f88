use std::collections::HashSet;

use crate::error::{PipelineError, Result};

use super::Script;

/// Removes markdown fences and any chatter around the outermost JSON object.
pub fn strip_wrapping(raw: &str) -> &str {
    let mut content = raw.trim();

    if content.contains("```") {
        if let Some(block) = content
            .split("```")
            .map(|part| part.trim())
            .map(|part| part.strip_prefix("json").unwrap_or(part).trim())
            .find(|part| part.starts_with('{'))
        {
            content = block;
        }
    }

    if let Some(start) = content.find('{') {
        content = &content[start..];
    }
    if let Some(end) = content.rfind('}') {
        content = &content[..=end];
    }
    content.trim()
}

/// Parses a model response into a [`Script`] with beats in `beat_number` order.
///
/// Any failure here is fatal for the run: the response is not retried.
pub fn parse_script(raw: &str) -> Result<Script> {
    let json_text = strip_wrapping(raw);
    let mut script: Script = serde_json::from_str(json_text)
        .map_err(|e| PipelineError::GenerationError(format!("Failed to parse script JSON: {}", e)))?;

    if script.beats.is_empty() {
        return Err(PipelineError::GenerationError(
            "Script contains no beats".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for beat in &script.beats {
        if beat.beat_number == 0 {
            return Err(PipelineError::GenerationError(
                "Beat numbers start at 1".to_string(),
            ));
        }
        if !seen.insert(beat.beat_number) {
            return Err(PipelineError::GenerationError(format!(
                "Duplicate beat number {}",
                beat.beat_number
            )));
        }
        if beat.text.trim().is_empty() {
            return Err(PipelineError::GenerationError(format!(
                "Beat {} has no text",
                beat.beat_number
            )));
        }
        if beat.image_prompt.trim().is_empty() || beat.video_keywords.is_empty() {
            return Err(PipelineError::GenerationError(format!(
                "Beat {} is missing its image prompt or video keywords",
                beat.beat_number
            )));
        }
    }

    script.beats.sort_by_key(|beat| beat.beat_number);
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "topic": "the vault",
        "hook_text": "THE VAULT WAS ALREADY OPEN",
        "script": "The vault was open. Nobody had the key.",
        "beats": [
            {"beat": 2, "text": "Nobody had the key", "image_prompt": "brass key on velvet", "video_keywords": ["key lock close up"]},
            {"beat": 1, "text": "The vault was open", "image_prompt": "open bank vault door", "video_keywords": "bank vault"}
        ]
    }"#;

    #[test]
    fn fenced_and_bare_responses_parse_identically() {
        let bare = parse_script(BODY).unwrap();
        let fenced = parse_script(&format!("```json\n{}\n```", BODY)).unwrap();
        let chatty = parse_script(&format!("Here is your script:\n```\n{}\n```\nEnjoy!", BODY)).unwrap();
        assert_eq!(bare, fenced);
        assert_eq!(bare, chatty);
    }

    #[test]
    fn beats_are_ordered_by_number_not_position() {
        let script = parse_script(BODY).unwrap();
        let numbers: Vec<u32> = script.beats.iter().map(|b| b.beat_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(script.beats[0].text, "The vault was open");
    }

    #[test]
    fn strip_wrapping_trims_surrounding_text() {
        assert_eq!(strip_wrapping("sure! {\"a\": 1} hope it helps"), "{\"a\": 1}");
        assert_eq!(strip_wrapping("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn malformed_json_is_a_generation_error() {
        let err = parse_script("```json\n{\"script\": \"x\", \"beats\": [\n```").unwrap_err();
        assert!(matches!(err, PipelineError::GenerationError(_)));
    }

    #[test]
    fn duplicate_and_empty_beats_are_rejected() {
        let dup = r#"{"script": "x", "beats": [
            {"beat": 1, "text": "a", "image_prompt": "b", "video_keywords": "c"},
            {"beat": 1, "text": "d", "image_prompt": "e", "video_keywords": "f"}
        ]}"#;
        assert!(parse_script(dup).is_err());
        assert!(parse_script(r#"{"script": "x", "beats": []}"#).is_err());

        let no_keywords = r#"{"script": "x", "beats": [
            {"beat": 1, "text": "a", "image_prompt": "b", "video_keywords": []}
        ]}"#;
        assert!(parse_script(no_keywords).is_err());
    }
}
