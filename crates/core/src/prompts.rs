//! The two static prompt templates and their rendering helpers.
//!
//! The template texts are load-bearing wire content: the answering behavior of
//! the deployed assistant depends on this exact wording (delimiters, casing,
//! even the spacing), so they are kept verbatim, including their typos. Do not
//! reflow them.

use crate::domain::SourceDocument;
use crate::history::ConversationTurn;

/// Answering template. `{question}` and `{context}` sit between `=========`
/// delimiter lines; the model is instructed to reply in Slack-flavored mrkdwn.
pub const QA_PROMPT: &str = r#"You are an experienced, friendly assistant to tour guides with many years of experience. Use the following pieces of context to answer the question at the end.
If you don't know the answer, just say you don't know. DO NOT try to make up an answer. If you can't answer a question completely, say that you can't before offering your almost accurate answer.
If the question is not related to the context, politely respond that you are tuned to only answer questions that are related to the context. The only exception is that you can do mathematical operations. 

If a word in a query is close to the meaning, you can assume that's what was meant (i.e. a "yoga shala" can mean the same as any yoga venue, such as a yoga hut or yoga area). 

If asked to give the price total for a trip or stay, use judgement to add the number of days/nights and multiply by the price per day/night. If there is a question about time or season, use judgement to determine when that trip would be. 
For example, if they ask for a trip in January, use the location to determine if that is low season or peak season and then do the calculation. Summarise the steps you took to get the answer in your response, in a similar way that a travel company would.

When retriving data, if the number is a float convert it to an integer to make it more realistic to read.  For example, 15.0 people becomes 15 people.

Answer in formatted mrkdwn, use only Slack-compatible mrkdwn, such as bold (*text*), italic (_text_), strikethrough (~text~), and lists (1., 2., 3.).

=========
{question}
=========
{context}
=========
Answer in Slack-compatible mrkdwn:
"#;

/// Condensation template: chat history plus a follow-up question in,
/// standalone question out.
pub const CONDENSE_PROMPT: &str = r#"Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question. If the follow up question is not closesly related to the chat history, the chat history must be ignored when generating the standalone question and your job is to repeat the follow up question exactly. 

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:"#;

/// Trims the question and collapses only the first embedded newline to a
/// space. Later newlines survive; that first-occurrence-only behavior is
/// deliberate and documented by test.
pub fn sanitize_question(raw: &str) -> String {
    raw.trim().replacen('\n', " ", 1)
}

/// Renders the answering prompt. Document texts are joined with a blank line
/// to form `{context}`; `{question}` is filled last so question text is never
/// re-scanned for placeholders.
pub fn render_qa_prompt(question: &str, documents: &[SourceDocument]) -> String {
    let context =
        documents.iter().map(|document| document.text.as_str()).collect::<Vec<_>>().join("\n\n");
    QA_PROMPT.replace("{context}", &context).replace("{question}", question)
}

/// Renders the condensation prompt with history as labeled lines, one per
/// turn, in chronological order.
pub fn render_condense_prompt(question: &str, history: &[ConversationTurn]) -> String {
    let chat_history =
        history.iter().map(ConversationTurn::render).collect::<Vec<_>>().join("\n");
    CONDENSE_PROMPT.replace("{chat_history}", &chat_history).replace("{question}", question)
}
