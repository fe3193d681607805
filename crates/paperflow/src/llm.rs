//! Language-model summarization of paper text.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint. Three provider
//! presets exist: Doubao (the default, via the Volcano Ark bot endpoint),
//! Qwen via DashScope's compatible mode, and a generic preset driven
//! entirely by `AI_*`/`OPENAI_*` variables. The prompt asks for a
//! structured review card over a page-capped excerpt; summarization never
//! fails outward, a generation error produces a placeholder card instead.

use chrono::Local;
use tokio::time::{sleep, Duration};

use super::*;

/// Volcano Ark bot endpoint for Doubao.
const DOUBAO_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3/bots";
/// DashScope OpenAI-compatible endpoint for Qwen.
const QWEN_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Note HTML markers that identify an already-generated summary.
pub const SUMMARY_MARKERS: [&str; 2] = ["AI总结", "豆包自动总结"];

/// Output language for the summary card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
  /// Chinese card (the default)
  #[default]
  Zh,
  /// English card
  En,
}

impl FromStr for Locale {
  type Err = PaperflowError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "zh" => Ok(Locale::Zh),
      "en" => Ok(Locale::En),
      other => Err(PaperflowError::Config(format!("unknown locale: {other}"))),
    }
  }
}

/// Resolved provider endpoint and credentials.
#[derive(Debug, Clone)]
pub struct LlmConfig {
  /// Provider label, e.g. `doubao`
  pub provider: String,
  /// Chat-completions base URL
  pub base_url: String,
  /// Bearer key for the endpoint
  pub api_key:  String,
  /// Model (or bot) identifier
  pub model:    String,
}

/// Reads an environment variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl LlmConfig {
  /// Resolves a provider configuration from explicit arguments with
  /// environment fallbacks.
  ///
  /// The provider comes from `provider`, then `AI_PROVIDER`, then defaults
  /// to `doubao`. Each provider has its own key/model/url variables:
  /// `ARK_*` for Doubao, `DASHSCOPE_*` for Qwen, and `AI_*`/`OPENAI_*` for
  /// anything else.
  pub fn resolve(
    provider: Option<&str>,
    model: Option<&str>,
    base_url: Option<&str>,
    api_key: Option<&str>,
    default_model: Option<&str>,
  ) -> Result<Self> {
    let provider = provider
      .map(String::from)
      .or_else(|| env_var("AI_PROVIDER"))
      .unwrap_or_else(|| "doubao".to_string())
      .to_lowercase();
    let explicit_key = api_key.map(String::from);
    let explicit_model = model.map(String::from);
    let explicit_url = base_url.map(String::from);

    let (api_key, model, base_url) = match provider.as_str() {
      "doubao" => {
        let key = explicit_key.or_else(|| env_var("ARK_API_KEY")).ok_or_else(|| {
          PaperflowError::Config("missing ARK_API_KEY for the doubao provider".into())
        })?;
        let model = explicit_model
          .or_else(|| env_var("ARK_BOT_MODEL"))
          .or_else(|| default_model.map(String::from))
          .ok_or_else(|| {
            PaperflowError::Config("missing doubao model id (set ARK_BOT_MODEL)".into())
          })?;
        let url =
          explicit_url.or_else(|| env_var("ARK_BASE_URL")).unwrap_or_else(|| DOUBAO_BASE_URL.into());
        (key, model, url)
      },
      "qwen" | "dashscope" => {
        let key = explicit_key.or_else(|| env_var("DASHSCOPE_API_KEY")).ok_or_else(|| {
          PaperflowError::Config("missing DASHSCOPE_API_KEY for the qwen provider".into())
        })?;
        let model = explicit_model
          .or_else(|| env_var("DASHSCOPE_MODEL"))
          .or_else(|| default_model.map(String::from))
          .unwrap_or_else(|| "qwen3-max".to_string());
        let url = explicit_url
          .or_else(|| env_var("DASHSCOPE_BASE_URL"))
          .unwrap_or_else(|| QWEN_BASE_URL.into());
        (key, model, url)
      },
      other => {
        let key = explicit_key
          .or_else(|| env_var("AI_API_KEY"))
          .or_else(|| env_var("OPENAI_API_KEY"))
          .ok_or_else(|| {
            PaperflowError::Config(format!(
              "missing API key for provider '{other}' (set AI_API_KEY or OPENAI_API_KEY)"
            ))
          })?;
        let model = explicit_model
          .or_else(|| env_var("AI_MODEL"))
          .or_else(|| env_var("OPENAI_MODEL"))
          .or_else(|| default_model.map(String::from))
          .ok_or_else(|| {
            PaperflowError::Config(format!(
              "missing model id for provider '{other}' (set AI_MODEL or OPENAI_MODEL)"
            ))
          })?;
        let url = explicit_url
          .or_else(|| env_var("AI_BASE_URL"))
          .or_else(|| env_var("OPENAI_BASE_URL"))
          .ok_or_else(|| {
            PaperflowError::Config(format!(
              "missing base URL for provider '{other}' (set AI_BASE_URL or OPENAI_BASE_URL)"
            ))
          })?;
        (key, model, url)
      },
    };

    Ok(LlmConfig { provider, base_url, api_key, model })
  }
}

/// Chat-completions client producing structured review cards.
pub struct SummaryClient {
  /// Resolved endpoint and credentials
  config:      LlmConfig,
  /// Shared HTTP client
  http:        reqwest::Client,
  /// Attempts before falling back to a placeholder card
  max_retries: usize,
}

impl SummaryClient {
  /// Builds a client with the default retry budget.
  pub fn new(config: LlmConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("paperflow/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(SummaryClient { config, http, max_retries: 2 })
  }

  /// Summarizes `text` into a review card.
  ///
  /// Never fails outward: after the retry budget is spent, the error lands
  /// in a placeholder card so batch runs keep moving.
  pub async fn summarize(
    &self,
    title: &str,
    text: &str,
    locale: Locale,
    max_chars: usize,
  ) -> String {
    let excerpt = truncate_preserving_paragraphs(text, max_chars);
    let out_limit = (max_chars / 2).clamp(800, 2000);
    let prompt = build_prompt(title, &excerpt, locale, out_limit);
    let system = match locale {
      Locale::Zh => "你是豆包，由字节跳动开发的科研解读助手。",
      Locale::En =>
        "You are Doubao, an AI research assistant specialized in AI/AGI/robotics paper analysis.",
    };

    let mut last_error = String::new();
    for attempt in 0..self.max_retries {
      match self.complete(system, &prompt).await {
        Ok(content) => return clean_output(&content),
        Err(e) => {
          warn!(title, attempt, error = %e, "summary generation failed");
          last_error = e.to_string();
          if attempt + 1 < self.max_retries {
            sleep(Duration::from_millis(1500)).await;
          }
        },
      }
    }
    fallback_card(title, &last_error, locale)
  }

  /// One chat-completions round trip.
  async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
    let body = json!({
      "model": self.config.model,
      "messages": [
        { "role": "system", "content": [{ "type": "text", "text": system }] },
        { "role": "user",   "content": [{ "type": "text", "text": prompt }] },
      ],
      "temperature": 0.15,
      "top_p": 0.9,
    });
    let response = self
      .http
      .post(format!("{}/chat/completions", self.config.base_url))
      .bearer_auth(&self.config.api_key)
      .json(&body)
      .send()
      .await?;
    let body: Value = crate::zotero::ensure_ok(&self.config.provider, response).await?.json().await?;
    body
      .pointer("/choices/0/message/content")
      .and_then(Value::as_str)
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .ok_or_else(|| PaperflowError::Api("completion carried no content".into()))
  }
}

/// Cuts `text` to `max_chars` characters, backing up to the last sentence
/// or line break when one falls in the final 40% of the window.
pub fn truncate_preserving_paragraphs(text: &str, max_chars: usize) -> String {
  if text.chars().count() <= max_chars {
    return text.to_string();
  }
  let cut_at = text.char_indices().nth(max_chars).map_or(text.len(), |(i, _)| i);
  let mut cut = &text[..cut_at];
  let breakpoints = ['\n', '。', '！', '？', '；', '.', '?', '!'];
  if let Some((idx, c)) = cut.char_indices().rev().find(|(_, c)| breakpoints.contains(c)) {
    if cut[..idx].chars().count() >= max_chars * 6 / 10 {
      cut = &cut[..idx + c.len_utf8()];
    }
  }
  format!("{}\n\n…（片段已截断，仅基于此生成）", cut.trim())
}

/// Builds the review-card prompt for one excerpt.
fn build_prompt(title: &str, excerpt: &str, locale: Locale, out_limit: usize) -> String {
  match locale {
    Locale::En => format!(
      r#"You are a professional reviewer and AI/AGI/Embodied Intelligence expert.
This task focuses on AI, AGI, embodied intelligence, and robotics; stay strictly within the excerpt and never invent outside knowledge.
Answer *strictly based on the excerpt below*: if information is missing, say "Not mentioned in excerpt".
Respond in **English Markdown**, at most {out_limit} words.

## Abstract (1-2 sentences)
- Main claim and quantitative gains if any.

## Problem & Motivation
- Core research question and context.

## Method & Key Techniques
- 3-5 bullet points, concise and factual.

## Experiments & Findings
- Dataset/setup
- Metrics/results (include numbers)
- Core conclusions with evidence markers [E#1-n]

## Limitations & Future Work
- 2-3 bullets each; say "Not mentioned" if missing.

## Evidence Snippets
- Direct quotes from the excerpt backing the claims above.

Title: {title}
EXCERPT:
{excerpt}"#
    ),
    Locale::Zh => format!(
      r#"你是资深的 AI / AGI / 具身智能 / 机器人领域论文审稿专家。
本任务聚焦于人工智能（AI）、通用人工智能（AGI）、具身智能与机器人领域。要求严格依托正文内容，不得凭空编造，不可引入外部知识。
仅可基于《正文片段》生成内容，不得主观推断。
请用 **Markdown 中文** 输出，整体不超过 {out_limit} 字。

## 摘要（1-2句）
- 简明概括论文主要贡献或性能提升（如出现数值请保留）。

## 研究背景与问题
- 背景与动机
- 目标与挑战

## 方法与关键技术
- 3-5 条技术要点（涉及模型架构、感知融合、控制算法等）

## 实验与结论
- 数据集与实验设置（若有提及）
- 结果指标（含数值）
- 核心结论（每条以【证据#n】标注）

## 局限性与未来工作
- 局限 2-3 条
- 未来工作 2-3 条（若未出现请写"未在片段出现"）

## 证据摘录
- 从片段中引用原句，编号为【证据#1,#2,…】

论文标题：{title}
《正文片段》：
{excerpt}"#
    ),
  }
}

/// Strips Markdown code fences models like to wrap their answer in.
pub fn clean_output(text: &str) -> String {
  lazy_static! {
    /// Opening fence at the start of a line.
    static ref FENCE_OPEN: Regex = Regex::new(r"(?m)^```(?:markdown|md)?").unwrap();
    /// Closing fence at the end of a line.
    static ref FENCE_CLOSE: Regex = Regex::new(r"(?m)```$").unwrap();
  }
  let text = FENCE_OPEN.replace_all(text, "");
  FENCE_CLOSE.replace_all(&text, "").trim().to_string()
}

/// Placeholder card for a failed generation.
fn fallback_card(title: &str, error: &str, locale: Locale) -> String {
  match locale {
    Locale::En => format!(
      "# {title}\n> Generation failed ({error}). Placeholder only.\n\n\
       ## Abstract\n- Not generated.\n\n\
       ## Problem / Method / Experiments / Limitations\n- Not present.\n\n\
       ## Evidence\n- (none)"
    ),
    Locale::Zh => format!(
      "# {title}\n> 生成失败（{error}）。以下为占位模板。\n\n\
       ## 研究框架梳理\n- 背景：未在片段出现\n- 方法：未在片段出现\n- 结果：未在片段出现\n\n\
       ## 证据摘录\n- （无）"
    ),
  }
}

/// Escapes the HTML-significant characters in note text.
fn escape_html(text: &str) -> String {
  text
    .replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
}

/// Wraps a Markdown summary in the note HTML Zotero stores.
///
/// The Markdown rides along escaped inside a `data-markdown` container so
/// the note survives clients that render it as plain text. The header
/// carries the marker [`has_existing_summary`] later looks for.
pub fn make_note_html(summary: &str) -> String {
  lazy_static! {
    /// Backslash escapes some models add in front of Markdown punctuation.
    static ref ESCAPED_MD: Regex = Regex::new(r"\\([#*_\-`\[\]()])").unwrap();
  }
  let markdown = ESCAPED_MD.replace_all(summary, "$1");
  let timestamp = Local::now().format("%Y-%m-%d %H:%M");
  format!(
    "<p><strong>AI总结</strong>（{timestamp}）</p>\
     <div data-markdown=\"true\" data-mime-type=\"text/markdown\" \
     style=\"white-space:pre-wrap\">{}</div>",
    escape_html(&markdown)
  )
}

/// Whether the item already carries a generated summary: a child note
/// containing one of the [`SUMMARY_MARKERS`], or tagged with `note_tag`.
pub fn has_existing_summary(children: &[Item], note_tag: Option<&str>) -> bool {
  children.iter().filter(|c| c.data.is_note()).any(|c| {
    let html = c.data.note.as_deref().unwrap_or("");
    if SUMMARY_MARKERS.iter().any(|marker| html.contains(marker)) {
      return true;
    }
    note_tag.is_some_and(|tag| c.data.has_tag(tag))
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncation_passes_short_text_through() {
    assert_eq!(truncate_preserving_paragraphs("short text", 100), "short text");
  }

  #[test]
  fn truncation_backs_up_to_a_sentence_break() {
    let text = "First sentence ends here. Second sentence runs much longer than the window";
    let cut = truncate_preserving_paragraphs(text, 40);
    assert!(cut.starts_with("First sentence ends here."));
    assert!(cut.ends_with("…（片段已截断，仅基于此生成）"));
    assert!(!cut.contains("Second sentence"));
  }

  #[test]
  fn truncation_counts_characters_not_bytes() {
    let text = "句".repeat(50);
    let cut = truncate_preserving_paragraphs(&text, 10);
    assert!(cut.starts_with(&"句".repeat(10)));
  }

  #[test]
  fn clean_output_strips_code_fences() {
    let wrapped = "```markdown\n## 摘要\n- 内容\n```";
    assert_eq!(clean_output(wrapped), "## 摘要\n- 内容");
    assert_eq!(clean_output("no fences"), "no fences");
  }

  #[test]
  fn note_html_escapes_and_marks_the_summary() {
    let html = make_note_html("## Summary\n- a < b & \\*kept\\*");
    assert!(html.contains("AI总结"));
    assert!(html.contains("a &lt; b &amp; *kept*"));
    assert!(html.contains("data-markdown=\"true\""));
  }

  #[test]
  fn existing_summaries_are_detected_by_marker_or_tag() {
    let marked = Item {
      key:     "NOTE1111".into(),
      version: 1,
      data:    ItemData {
        item_type: "note".into(),
        note: Some("<p><strong>AI总结</strong>（2026-01-01 00:00）</p>".into()),
        ..Default::default()
      },
    };
    assert!(has_existing_summary(std::slice::from_ref(&marked), None));

    let tagged = Item {
      key:     "NOTE2222".into(),
      version: 1,
      data:    ItemData {
        item_type: "note".into(),
        note: Some("<p>hand-written</p>".into()),
        tags: vec![Tag::new("summary-note")],
        ..Default::default()
      },
    };
    assert!(!has_existing_summary(std::slice::from_ref(&tagged), None));
    assert!(has_existing_summary(&[tagged], Some("summary-note")));
    assert!(has_existing_summary(&[marked], Some("other-tag")));
  }

  #[test]
  fn config_resolution_honors_explicit_arguments() {
    let config = LlmConfig::resolve(
      Some("generic"),
      Some("gpt-x"),
      Some("https://llm.example/v1"),
      Some("sk-test"),
      None,
    )
    .unwrap();
    assert_eq!(config.provider, "generic");
    assert_eq!(config.model, "gpt-x");
    assert_eq!(config.base_url, "https://llm.example/v1");

    let doubao =
      LlmConfig::resolve(Some("doubao"), Some("bot-123"), None, Some("ark-key"), None).unwrap();
    assert_eq!(doubao.base_url, DOUBAO_BASE_URL);
    assert_eq!(doubao.model, "bot-123");
  }

  #[test]
  fn prompts_carry_the_title_and_budget() {
    let prompt = build_prompt("A Paper", "excerpt body", Locale::En, 900);
    assert!(prompt.contains("Title: A Paper"));
    assert!(prompt.contains("900 words"));

    let zh = build_prompt("论文", "正文", Locale::Zh, 1000);
    assert!(zh.contains("论文标题：论文"));
    assert!(zh.contains("1000 字"));
  }
}
