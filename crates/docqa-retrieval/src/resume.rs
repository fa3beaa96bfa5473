//! File-name heuristics for resume-scoped retrieval.

const RESUME_NAME_MARKERS: &[&str] = &["resume", "résumé", "curriculum", "profile", "candidate"];
const RESUME_NAME_TOKENS: &[&str] = &["cv"];
const RESUME_EXTENSIONS: &[&str] = &["doc", "docx", "odt", "rtf"];

fn split_name(file_name: &str) -> (String, Option<String>) {
    let lower = file_name.to_lowercase();
    match lower.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (lower, None),
    }
}

/// True when any configured pattern (`notes`, `syllabus`, ...) occurs in the name.
pub fn is_excluded(file_name: &str, non_resume_patterns: &[String]) -> bool {
    let lower = file_name.to_lowercase();
    non_resume_patterns.iter().any(|p| !p.is_empty() && lower.contains(&p.to_lowercase()))
}

/// Whether a file looks like a resume from its name alone.
pub fn looks_like_resume(file_name: &str, non_resume_patterns: &[String]) -> bool {
    if is_excluded(file_name, non_resume_patterns) {
        return false;
    }
    let (stem, ext) = split_name(file_name);
    if RESUME_NAME_MARKERS.iter().any(|m| stem.contains(m)) {
        return true;
    }
    if stem.split(|c: char| !c.is_alphanumeric()).any(|t| RESUME_NAME_TOKENS.contains(&t)) {
        return true;
    }
    ext.is_some_and(|e| RESUME_EXTENSIONS.contains(&e.as_str()))
}

/// Human-readable subject of a resume file: `resume_alice_2024.pdf` -> `alice 2024`.
pub fn subject_from_file_name(file_name: &str) -> String {
    let (stem, _) = split_name(file_name);
    let words: Vec<&str> = stem
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| !RESUME_NAME_MARKERS.contains(t) && !RESUME_NAME_TOKENS.contains(t))
        .collect();
    if words.is_empty() { stem } else { words.join(" ") }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        ["notes", "tutorial", "lecture", "syllabus", "invoice"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resume_names_are_recognized() {
        let p = patterns();
        assert!(looks_like_resume("resume_alice.txt", &p));
        assert!(looks_like_resume("Bob_CV.pdf", &p));
        assert!(looks_like_resume("candidate-profile.md", &p));
        assert!(looks_like_resume("jane_doe.docx", &p));
        assert!(!looks_like_resume("data.csv", &p));
        assert!(!looks_like_resume("report.pdf", &p));
    }

    #[test]
    fn exclusions_win() {
        let p = patterns();
        assert!(!looks_like_resume("resume_writing_tutorial.pdf", &p));
        assert!(!looks_like_resume("cv_lecture_notes.docx", &p));
        assert!(is_excluded("Week3_Notes.txt", &p));
    }

    #[test]
    fn subject_strips_markers() {
        assert_eq!(subject_from_file_name("resume_alice.txt"), "alice");
        assert_eq!(subject_from_file_name("Bob-CV.pdf"), "bob");
        assert_eq!(subject_from_file_name("resume.pdf"), "resume");
    }
}
