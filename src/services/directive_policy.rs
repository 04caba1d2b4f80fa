//! Directive intent classification.
//!
//! Decides from free text whether a directive creates work, is casual chat,
//! or explicitly asks for no task. The rule is conservative: a directive is
//! only treated as lightweight when it carries a lightweight signal and no
//! work signal at all.

use crate::domain::models::{DirectivePolicy, Locale, SkipReason};

const NO_TASK_PHRASES: &[&str] = &[
    // en
    "no task",
    "don't create a task",
    "do not create a task",
    "don't delegate",
    "do not delegate",
    "no need to delegate",
    "just chatting",
    "no work needed",
    "fyi only",
    // ko
    "업무 아님",
    "업무 지시 아님",
    "태스크 만들지",
    "작업 만들지",
    "위임하지 마",
    "그냥 대화",
    // ja
    "タスク不要",
    "タスクにしないで",
    "作業不要",
    "委任しないで",
    // zh
    "不用创建任务",
    "不要创建任务",
    "无需任务",
    "不要分配",
];

const LIGHTWEIGHT_WORDS: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thx", "ty", "ping", "ok", "okay", "yo", "morning", "lol",
    "cheers",
];

const LIGHTWEIGHT_PHRASES: &[&str] = &[
    "thank you",
    "good morning",
    "good night",
    "got it",
    "nice work",
    "good job",
    // ko
    "안녕",
    "고마워",
    "감사",
    "수고",
    "ㅎㅎ",
    "ㅋㅋ",
    // ja
    "こんにちは",
    "ありがとう",
    "おはよう",
    "お疲れ",
    // zh
    "你好",
    "谢谢",
    "早上好",
    "辛苦",
];

const WORK_WORDS: &[&str] = &[
    "implement", "fix", "build", "create", "add", "update", "deploy", "write", "review", "test",
    "refactor", "design", "bug", "feature", "release", "investigate", "analyze", "analyse",
    "migrate", "ship", "draft", "prepare", "audit", "optimize", "document", "plan", "setup",
    "configure", "remove", "delete", "check",
];

const WORK_PHRASES: &[&str] = &[
    "set up",
    "look into",
    "can you",
    "could you",
    // ko
    "구현",
    "수정",
    "개발",
    "만들어",
    "추가",
    "배포",
    "작성",
    "검토",
    "테스트",
    "버그",
    "기능",
    "분석",
    "해줘",
    "해 줘",
    "부탁",
    // ja
    "実装",
    "修正",
    "作成",
    "追加",
    "デプロイ",
    "レビュー",
    "テスト",
    "バグ",
    "機能",
    "分析",
    "してください",
    // zh
    "实现",
    "修复",
    "开发",
    "创建",
    "添加",
    "部署",
    "编写",
    "审查",
    "测试",
    "功能",
    "分析",
    "帮我",
];

const URGENT_PHRASES: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "right now",
    "hotfix",
    "긴급",
    "즉시",
    "급해",
    "바로",
    "至急",
    "すぐ",
    "紧急",
    "立刻",
    "马上",
];

const SINGLE_STEP_PHRASES: &[&str] = &[
    "no subtasks",
    "single step",
    "one-liner",
    "quick",
    "simple",
    "간단",
    "단순",
    "簡単",
    "简单",
];

/// Lowercased text with every run of non-alphanumerics collapsed to one
/// space and padded, so word lookups can use `" word "`.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() || c == '\'' {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

fn has_word(normalized: &str, words: &[&str]) -> bool {
    words.iter().any(|w| normalized.contains(&format!(" {w} ")))
}

/// ASCII phrases match at a word start and may run into an inflection
/// ("urgently", "no tasks"); other scripts match anywhere.
fn has_phrase(normalized: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| {
        if !p.is_ascii() {
            return normalized.contains(p);
        }
        let needle = format!(" {p}");
        normalized.match_indices(&needle).any(|(idx, m)| {
            normalized[idx + m.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == ' ' || c.is_ascii_alphabetic())
        })
    })
}

/// Classify a directive's intent.
pub fn classify(text: &str) -> DirectivePolicy {
    let normalized = normalize(text);

    if normalized.trim().is_empty() {
        return DirectivePolicy {
            skip_delegation: true,
            reason: Some(SkipReason::Lightweight),
            skip_planned_meeting: true,
            skip_plan_subtasks: true,
        };
    }

    if has_phrase(&normalized, NO_TASK_PHRASES) {
        return DirectivePolicy {
            skip_delegation: true,
            reason: Some(SkipReason::NoTask),
            skip_planned_meeting: true,
            skip_plan_subtasks: true,
        };
    }

    let work = has_word(&normalized, WORK_WORDS) || has_phrase(&normalized, WORK_PHRASES);
    let lightweight =
        has_word(&normalized, LIGHTWEIGHT_WORDS) || has_phrase(&normalized, LIGHTWEIGHT_PHRASES);

    if lightweight && !work {
        return DirectivePolicy {
            skip_delegation: true,
            reason: Some(SkipReason::Lightweight),
            skip_planned_meeting: true,
            skip_plan_subtasks: true,
        };
    }

    let urgent = has_phrase(&normalized, URGENT_PHRASES);
    DirectivePolicy {
        skip_delegation: false,
        reason: None,
        skip_planned_meeting: urgent,
        skip_plan_subtasks: urgent || has_phrase(&normalized, SINGLE_STEP_PHRASES),
    }
}

/// Guess the operator's language from the script used.
pub fn detect_locale(text: &str) -> Locale {
    let mut hangul = 0usize;
    let mut kana = 0usize;
    let mut han = 0usize;

    for c in text.chars() {
        match c {
            '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3131}'..='\u{318E}' => {
                hangul += 1;
            }
            '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}' => kana += 1,
            '\u{4E00}'..='\u{9FFF}' => han += 1,
            _ => {}
        }
    }

    if hangul > 0 && hangul >= kana {
        Locale::Ko
    } else if kana > 0 {
        Locale::Ja
    } else if han > 0 {
        Locale::Zh
    } else {
        Locale::En
    }
}
