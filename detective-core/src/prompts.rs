//! Prompt templates for case generation, interrogation and scene recreation.

use crate::model::{Difficulty, GameSession, Suspect};

const CASE_FORMAT: &str = r#"{
  "description": "Case overview (string)",
  "victim": "Victim name and identity (string)",
  "suspects": [
    {
      "id": "1",
      "name": "Suspect name",
      "occupation": "Occupation",
      "relationship": "Relationship to the victim",
      "motive": "Apparent motive",
      "alibi": "Alibi"
    }
  ],
  "evidence": [
    {
      "id": "1",
      "name": "Evidence name",
      "description": "Detailed description",
      "location": "Where it was found"
    }
  ],
  "culpritId": "id of the guilty suspect",
  "solution": "How the crime was committed, naming the culprit"
}"#;

/// Prompt for a new case at the given difficulty.
pub fn case_prompt(difficulty: Difficulty) -> String {
    let params = difficulty.params();

    let mut prompt = format!(
        "You are a mystery novelist. Invent an original murder case and return it \
strictly as JSON in this format:\n\n{CASE_FORMAT}\n\n\
Requirements:\n\
1. Output only the JSON object, with no commentary.\n\
2. Every field is a string.\n\
3. The culprit must be one of the suspects, and culpritId must be that suspect's id.\n\
4. Give every suspect a complete background and a plausible motive.\n\
5. Use an unusual setting and avoid stock characters and clues.\n\
\nDifficulty requirements:\n\
- Number of suspects: {}\n\
- Number of evidence items: {}\n\
- Complexity level: {}\n",
        params.suspect_count, params.evidence_count, params.complexity
    );

    if !params.avoid.is_empty() {
        prompt.push_str(&format!("- Avoid using: {}\n", params.avoid.join(", ")));
    }

    prompt
}

/// Prompt for a suspect's answers under questioning.
pub fn interrogation_prompt(session: &GameSession, suspect: &Suspect) -> String {
    format!(
        "You are interrogating suspect {name}.\n\n\
Case background: {description}\n\
Victim: {victim}\n\n\
Suspect information:\n\
- Name: {name}\n\
- Occupation: {occupation}\n\
- Relationship to the victim: {relationship}\n\
- Motive: {motive}\n\
- Alibi: {alibi}\n\n\
Answer the following questions in character. The suspect may conceal things or lie, \
but must stay consistent with the facts of the case.\n\n\
1. Where were you at the time of the incident?\n\
2. When did you last see the victim?\n\
3. Is there anything you are hiding?\n\
4. Can anyone confirm your alibi?",
        name = suspect.name,
        description = session.description,
        victim = session.victim_info,
        occupation = suspect.occupation,
        relationship = suspect.relationship_to_victim,
        motive = suspect.motive,
        alibi = suspect.alibi,
    )
}

/// Prompt for a narrative recreation of the crime scene.
pub fn scene_prompt(session: &GameSession) -> String {
    let suspects = session
        .suspects
        .iter()
        .map(|s| format!("- {}: {}", s.name, s.relationship_to_victim))
        .collect::<Vec<_>>()
        .join("\n");
    let evidence = session
        .evidence
        .iter()
        .map(|e| format!("- {} ({}): {}", e.name, e.location, e.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Based on the following case, describe a recreation of the crime scene.\n\n\
Case: {}\n\
Victim: {}\n\n\
Suspects:\n{suspects}\n\n\
Evidence:\n{evidence}\n\n\
Cover the surroundings, a likely sequence of events, the key details and anything \
suspicious. Do not reveal who the culprit is.",
        session.description, session.victim_info
    )
}
