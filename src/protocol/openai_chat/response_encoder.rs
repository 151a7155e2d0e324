use super::{
    AssistantMessage, CompletionChoice, CompletionResponse, ModelCard, ModelList, Role, Usage,
    CHAT_COMPLETION_OBJECT, FINISH_REASON_STOP,
};

/// Assemble a synchronous completion with a single `stop` choice.
#[must_use]
pub fn build_completion_response(
    id: String,
    created: u64,
    model: &str,
    content: String,
    usage: Usage,
) -> CompletionResponse {
    CompletionResponse {
        id,
        object: CHAT_COMPLETION_OBJECT.to_string(),
        created,
        model: model.to_string(),
        choices: vec![CompletionChoice {
            index: 0,
            message: AssistantMessage {
                role: Role::Assistant,
                content,
            },
            finish_reason: FINISH_REASON_STOP.to_string(),
        }],
        usage,
    }
}

/// Build the `/v1/models` listing for the allow-listed model ids.
#[must_use]
pub fn build_model_list<'a, I>(model_ids: I, owned_by: &str) -> ModelList
where
    I: IntoIterator<Item = &'a str>,
{
    ModelList {
        object: "list".to_string(),
        data: model_ids
            .into_iter()
            .map(|id| ModelCard {
                id: id.to_string(),
                object: "model".to_string(),
                created: 0,
                owned_by: owned_by.to_string(),
            })
            .collect(),
    }
}
