//! Operator-facing notices in the operator's language.

use crate::domain::models::{Locale, SkipReason};

/// Every message the orchestrator sends to an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice<'a> {
    /// A directive was noted without creating work.
    DirectiveSkipped { reason: SkipReason },
    /// A task was accepted by a department.
    Accepted { department: &'a str, title: &'a str },
    /// A department received a cross-department request.
    CrossDepartmentAck { department: &'a str, title: &'a str },
    /// A department in the coordination queue has no lead.
    DepartmentSkipped { department: &'a str },
    /// Every subtask of a task is done.
    AllSubtasksComplete { title: &'a str },
    /// A task passed review and is done.
    TaskCompleted { title: &'a str },
    /// A worker exited with a failure.
    TaskFailed { title: &'a str, exit_code: i32 },
    /// Recovery found no evidence the worker ever ran.
    WatchdogReset { title: &'a str },
    Paused { title: &'a str },
    Cancelled { title: &'a str },
}

impl Notice<'_> {
    pub fn render(&self, locale: Locale) -> String {
        match locale {
            Locale::En => self.render_en(),
            Locale::Ko => self.render_ko(),
            Locale::Ja => self.render_ja(),
            Locale::Zh => self.render_zh(),
        }
    }

    fn render_en(&self) -> String {
        match self {
            Self::DirectiveSkipped { reason: SkipReason::NoTask } => {
                "Noted. No task was created.".to_string()
            }
            Self::DirectiveSkipped { reason: SkipReason::Lightweight } => {
                "Hello! Send a directive whenever there is work to do.".to_string()
            }
            Self::Accepted { department, title } => format!("[{department}] Accepted: {title}"),
            Self::CrossDepartmentAck { department, title } => {
                format!("[{department}] Received the request and started work: {title}")
            }
            Self::DepartmentSkipped { department } => {
                format!("[{department}] has no team leader; skipping this department.")
            }
            Self::AllSubtasksComplete { title } => format!("All subtasks are complete: {title}"),
            Self::TaskCompleted { title } => format!("Task completed: {title}"),
            Self::TaskFailed { title, exit_code } => {
                format!("Task failed (exit code {exit_code}): {title}")
            }
            Self::WatchdogReset { title } => format!(
                "Watchdog: no sign the worker ever started, task moved back to inbox: {title}"
            ),
            Self::Paused { title } => format!("Task paused: {title}"),
            Self::Cancelled { title } => format!("Task cancelled: {title}"),
        }
    }

    fn render_ko(&self) -> String {
        match self {
            Self::DirectiveSkipped { reason: SkipReason::NoTask } => {
                "확인했습니다. 업무는 생성하지 않았습니다.".to_string()
            }
            Self::DirectiveSkipped { reason: SkipReason::Lightweight } => {
                "안녕하세요! 업무가 있으면 언제든 지시해 주세요.".to_string()
            }
            Self::Accepted { department, title } => format!("[{department}] 업무 접수: {title}"),
            Self::CrossDepartmentAck { department, title } => {
                format!("[{department}] 협업 요청을 받아 작업을 시작합니다: {title}")
            }
            Self::DepartmentSkipped { department } => {
                format!("[{department}] 팀장이 없어 이 부서는 건너뜁니다.")
            }
            Self::AllSubtasksComplete { title } => format!("모든 하위 작업이 완료되었습니다: {title}"),
            Self::TaskCompleted { title } => format!("업무 완료: {title}"),
            Self::TaskFailed { title, exit_code } => {
                format!("업무 실패 (종료 코드 {exit_code}): {title}")
            }
            Self::WatchdogReset { title } => {
                format!("워치독: 작업이 시작된 흔적이 없어 수신함으로 되돌렸습니다: {title}")
            }
            Self::Paused { title } => format!("업무 일시 중지: {title}"),
            Self::Cancelled { title } => format!("업무 취소: {title}"),
        }
    }

    fn render_ja(&self) -> String {
        match self {
            Self::DirectiveSkipped { reason: SkipReason::NoTask } => {
                "承知しました。タスクは作成していません。".to_string()
            }
            Self::DirectiveSkipped { reason: SkipReason::Lightweight } => {
                "こんにちは！作業があればいつでも指示してください。".to_string()
            }
            Self::Accepted { department, title } => format!("[{department}] 受付: {title}"),
            Self::CrossDepartmentAck { department, title } => {
                format!("[{department}] 依頼を受け付け、作業を開始します: {title}")
            }
            Self::DepartmentSkipped { department } => {
                format!("[{department}] チームリーダーが不在のため、この部署をスキップします。")
            }
            Self::AllSubtasksComplete { title } => format!("すべてのサブタスクが完了しました: {title}"),
            Self::TaskCompleted { title } => format!("タスク完了: {title}"),
            Self::TaskFailed { title, exit_code } => {
                format!("タスク失敗 (終了コード {exit_code}): {title}")
            }
            Self::WatchdogReset { title } => {
                format!("ウォッチドッグ: 作業開始の形跡がないため受信箱に戻しました: {title}")
            }
            Self::Paused { title } => format!("タスク一時停止: {title}"),
            Self::Cancelled { title } => format!("タスク取り消し: {title}"),
        }
    }

    fn render_zh(&self) -> String {
        match self {
            Self::DirectiveSkipped { reason: SkipReason::NoTask } => {
                "收到。未创建任务。".to_string()
            }
            Self::DirectiveSkipped { reason: SkipReason::Lightweight } => {
                "你好！有工作随时吩咐。".to_string()
            }
            Self::Accepted { department, title } => format!("[{department}] 已受理: {title}"),
            Self::CrossDepartmentAck { department, title } => {
                format!("[{department}] 已收到协作请求并开始工作: {title}")
            }
            Self::DepartmentSkipped { department } => {
                format!("[{department}] 没有组长，跳过该部门。")
            }
            Self::AllSubtasksComplete { title } => format!("所有子任务已完成: {title}"),
            Self::TaskCompleted { title } => format!("任务完成: {title}"),
            Self::TaskFailed { title, exit_code } => {
                format!("任务失败 (退出码 {exit_code}): {title}")
            }
            Self::WatchdogReset { title } => {
                format!("看门狗: 没有发现任务开始的迹象，已退回收件箱: {title}")
            }
            Self::Paused { title } => format!("任务已暂停: {title}"),
            Self::Cancelled { title } => format!("任务已取消: {title}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_locale_renders_title() {
        let notice = Notice::WatchdogReset { title: "Fix login" };
        for locale in [Locale::En, Locale::Ko, Locale::Ja, Locale::Zh] {
            assert!(notice.render(locale).contains("Fix login"), "{locale:?}");
        }
    }

    #[test]
    fn test_failure_mentions_exit_code() {
        let text = Notice::TaskFailed {
            title: "Deploy",
            exit_code: 2,
        }
        .render(Locale::En);
        assert_eq!(text, "Task failed (exit code 2): Deploy");
    }
}
