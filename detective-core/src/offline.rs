//! Scripted generator for playing without a backend.
//!
//! Serves one canned case, a canned statement per suspect and a canned scene.

use crate::generation::{GenerationError, Generator};
use crate::model::GenerationConfig;
use async_trait::async_trait;
use std::time::Duration;

/// The canned case, in the same JSON shape a model is asked to produce.
pub const DEMO_CASE: &str = r#"{
  "description": "The night keeper of the Halvorsen Seed Vault was found dead at the foot of the cold-storage stairs after a storm cut the power for forty minutes.",
  "victim": "Dr. Anneli Halvorsen, 52, vault director",
  "suspects": [
    {
      "id": "1",
      "name": "Rune Dahl",
      "occupation": "Generator technician",
      "relationship": "Contractor who maintained the backup power",
      "motive": "Anneli was about to report him for falsified maintenance logs",
      "alibi": "Says he was restarting the generator in the outbuilding"
    },
    {
      "id": "2",
      "name": "Priya Venkataraman",
      "occupation": "Botanist",
      "relationship": "Visiting researcher sharing the director's lab",
      "motive": "Anneli had rejected her funding proposal that morning",
      "alibi": "Claims she was asleep in the guest quarters"
    },
    {
      "id": "3",
      "name": "Jonas Eklund",
      "occupation": "Security guard",
      "relationship": "Night guard on the victim's shift",
      "motive": "Owed the victim a large personal loan",
      "alibi": "Says he was walking the perimeter fence"
    }
  ],
  "evidence": [
    {
      "id": "1",
      "name": "Generator start log",
      "description": "The backup generator was started manually at 01:12, eleven minutes after the outage began",
      "location": "Power outbuilding"
    },
    {
      "id": "2",
      "name": "Frost-free boot prints",
      "description": "Dry prints on the cold-storage stairs, made by someone who came from indoors",
      "location": "Cold-storage stairwell"
    },
    {
      "id": "3",
      "name": "Edited maintenance binder",
      "description": "Pages from the last three months were replaced with fresh copies",
      "location": "Director's office"
    }
  ],
  "culpritId": "1",
  "solution": "Rune Dahl started the generator early, came back inside through the loading bay, and pushed Anneli down the stairs when she confronted him with the falsified maintenance logs."
}"#;

const DEMO_SCENE: &str = "The cold-storage stairwell is lit only by the red emergency strip. \
Frost coats the railing below the third step, but the prints leading down are dry. \
Whoever was here came from a warm room, not from the storm outside. \
At the bottom, the director's torch lies switched off, as if she expected the lights to return.";

fn demo_statement(name: &str) -> String {
    match name {
        "Rune Dahl" => "\"I was in the outbuilding the whole time. The generator is temperamental, \
it took me ages to get it going. The log will show you. Anneli and I got on fine.\""
            .to_string(),
        "Priya Venkataraman" => "\"I was asleep. The storm woke me when the power dropped, \
but I stayed in bed. Yes, she turned down my proposal. That is science, not murder.\""
            .to_string(),
        "Jonas Eklund" => "\"Perimeter, like every night. I saw lights in the outbuilding \
early on, then someone crossing to the loading bay. I assumed it was Rune finishing up.\""
            .to_string(),
        other => format!("\"I have nothing more to say,\" {other} replies."),
    }
}

/// Generator that answers from the canned demo case.
#[derive(Debug, Clone)]
pub struct OfflineGenerator {
    delay: Duration,
}

impl Default for OfflineGenerator {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1500),
        }
    }
}

impl OfflineGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated latency before the answer starts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn answer(prompt: &str) -> String {
        if prompt.contains("\"culpritId\"") {
            return DEMO_CASE.to_string();
        }
        if let Some(rest) = prompt.strip_prefix("You are interrogating suspect ") {
            let name = rest.split('.').next().unwrap_or_default();
            return demo_statement(name);
        }
        DEMO_SCENE.to_string()
    }
}

#[async_trait]
impl Generator for OfflineGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        tokio::time::sleep(self.delay).await;
        Ok(Self::answer(prompt))
    }

    async fn generate_streaming(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String, GenerationError> {
        tokio::time::sleep(self.delay).await;
        let text = Self::answer(prompt);
        for word in text.split_inclusive(' ') {
            on_chunk(word);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::CaseDraft;
    use crate::model::Difficulty;
    use crate::prompts;

    #[test]
    fn test_demo_case_is_valid() {
        let draft = CaseDraft::parse(DEMO_CASE).unwrap();
        assert_eq!(draft.culprit_name(), Some("Rune Dahl"));
        assert_eq!(draft.suspects.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_routes_by_prompt() {
        let generator = OfflineGenerator::new();
        let config = GenerationConfig::default();

        let case = generator
            .generate(&prompts::case_prompt(Difficulty::Normal), &config)
            .await
            .unwrap();
        assert_eq!(case, DEMO_CASE);

        let session = crate::testing::demo_session();
        let prompt = prompts::interrogation_prompt(&session, &session.suspects[2]);
        let mut chunks = Vec::new();
        let mut collect = |c: &str| chunks.push(c.to_string());
        let statement = generator
            .generate_streaming(&prompt, &config, &mut collect)
            .await
            .unwrap();
        assert!(statement.contains("loading bay"));
        assert_eq!(chunks.concat(), statement);
    }
}
