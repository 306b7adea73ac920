//! 打字机渲染器
//!
//! 片段到达的节奏由网络决定，显示节奏固定（默认 50ms 一个字符），两者通过内部队列解耦。
//! 渲染状态只由渲染任务自己修改，其它组件通过 `TypewriterHandle` 发送指令。
//!
//! 状态流转：`Idle → Streaming → Draining → Idle`（完成），或任意状态 → `Idle`（隐藏/新请求）。

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::settings::ExtensionSettings;
use crate::translation::types::TranslationResult;

use super::geometry::{clamp_to_viewport, initial_position, Point};
use super::presenter::{OverlayPresenter, PanelView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypewriterConfig {
    /// 每个字符的显示间隔
    pub interval: Duration,
    /// 完成时检查队列是否清空的间隔
    pub finish_poll: Duration,
}

impl Default for TypewriterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            finish_poll: Duration::from_millis(100),
        }
    }
}

impl TypewriterConfig {
    pub fn from_settings(settings: &ExtensionSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.typewriter_interval_ms.max(1)),
            finish_poll: Duration::from_millis(settings.finish_poll_ms.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPhase {
    #[default]
    Idle,
    Streaming,
    /// 已收到最终结果，等待队列播放完
    Draining,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalView {
    pub text: String,
    pub pronunciation: Option<String>,
}

impl FinalView {
    fn from_result(result: &TranslationResult, show_pronunciation: bool) -> Self {
        Self {
            text: result.translated_text.clone(),
            pronunciation: if show_pronunciation {
                result.pronunciation.clone()
            } else {
                None
            },
        }
    }
}

/// 渲染状态（纯状态机，不涉及计时器）
#[derive(Debug, Default)]
pub struct RenderState {
    generation: u64,
    phase: RenderPhase,
    pending: VecDeque<char>,
    displayed: String,
    /// 当前请求已给出最终内容，之后的片段一律忽略
    sealed: bool,
    final_view: Option<FinalView>,
}

impl RenderState {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// 切换到新请求
    pub fn begin(&mut self, generation: u64) {
        self.reset();
        self.generation = generation;
    }

    pub fn reset(&mut self) {
        self.phase = RenderPhase::Idle;
        self.pending.clear();
        self.displayed.clear();
        self.sealed = false;
        self.final_view = None;
    }

    /// 按 Unicode 码点拆分片段并入队；已封口时返回 false
    pub fn enqueue(&mut self, fragment: &str) -> bool {
        if self.sealed {
            return false;
        }
        if self.phase == RenderPhase::Idle {
            self.phase = RenderPhase::Streaming;
            self.displayed.clear();
        }
        self.pending.extend(fragment.chars());
        true
    }

    /// 显示一个字符；队列为空时返回 false
    pub fn tick(&mut self) -> bool {
        match self.pending.pop_front() {
            Some(c) => {
                self.displayed.push(c);
                true
            }
            None => false,
        }
    }

    /// 记录最终结果；同一请求只接受一次
    pub fn finish(&mut self, view: FinalView) -> bool {
        if self.sealed {
            return false;
        }
        self.sealed = true;
        self.final_view = Some(view);
        self.phase = RenderPhase::Draining;
        true
    }

    /// 队列已播放完时取出最终结果，并用它替换已显示文本
    pub fn take_final(&mut self) -> Option<FinalView> {
        if self.phase != RenderPhase::Draining || self.has_pending() {
            return None;
        }
        let view = self.final_view.take()?;
        self.phase = RenderPhase::Idle;
        self.displayed = view.text.clone();
        Some(view)
    }

    /// 非流式结果或错误：丢弃队列，直接封口
    pub fn seal(&mut self) {
        self.reset();
        self.sealed = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Show {
        generation: u64,
        anchor: Point,
    },
    SetLoading {
        generation: u64,
        streaming: bool,
    },
    Enqueue {
        generation: u64,
        fragment: String,
    },
    Finish {
        generation: u64,
        result: TranslationResult,
        show_pronunciation: bool,
    },
    Immediate {
        generation: u64,
        result: TranslationResult,
        show_pronunciation: bool,
    },
    Error {
        generation: u64,
        message: String,
    },
    Hide {
        generation: u64,
    },
}

impl RenderCommand {
    fn generation(&self) -> u64 {
        match self {
            RenderCommand::Show { generation, .. }
            | RenderCommand::SetLoading { generation, .. }
            | RenderCommand::Enqueue { generation, .. }
            | RenderCommand::Finish { generation, .. }
            | RenderCommand::Immediate { generation, .. }
            | RenderCommand::Error { generation, .. }
            | RenderCommand::Hide { generation } => *generation,
        }
    }
}

/// 渲染任务句柄；所有方法都是非阻塞的
#[derive(Clone)]
pub struct TypewriterHandle {
    tx: mpsc::UnboundedSender<RenderCommand>,
}

impl TypewriterHandle {
    /// 启动渲染任务；所有句柄被丢弃后任务退出
    pub fn spawn(
        presenter: Box<dyn OverlayPresenter>,
        config: TypewriterConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = TypewriterActor {
            presenter,
            config,
            state: RenderState::default(),
            cadence: None,
            finish_poll: None,
        };
        (Self { tx }, tokio::spawn(actor.run(rx)))
    }

    fn send(&self, command: RenderCommand) {
        if self.tx.send(command).is_err() {
            debug!("[TranslationPanel] 渲染任务已退出，忽略指令");
        }
    }

    pub fn show(&self, generation: u64, anchor: Point) {
        self.send(RenderCommand::Show { generation, anchor });
    }

    pub fn set_loading(&self, generation: u64, streaming: bool) {
        self.send(RenderCommand::SetLoading {
            generation,
            streaming,
        });
    }

    pub fn enqueue(&self, generation: u64, fragment: impl Into<String>) {
        self.send(RenderCommand::Enqueue {
            generation,
            fragment: fragment.into(),
        });
    }

    pub fn finish(&self, generation: u64, result: TranslationResult, show_pronunciation: bool) {
        self.send(RenderCommand::Finish {
            generation,
            result,
            show_pronunciation,
        });
    }

    pub fn set_immediate_result(
        &self,
        generation: u64,
        result: TranslationResult,
        show_pronunciation: bool,
    ) {
        self.send(RenderCommand::Immediate {
            generation,
            result,
            show_pronunciation,
        });
    }

    pub fn set_error(&self, generation: u64, message: impl Into<String>) {
        self.send(RenderCommand::Error {
            generation,
            message: message.into(),
        });
    }

    pub fn hide(&self, generation: u64) {
        self.send(RenderCommand::Hide { generation });
    }
}

struct TypewriterActor {
    presenter: Box<dyn OverlayPresenter>,
    config: TypewriterConfig,
    state: RenderState,
    /// 打字节拍；仅在队列非空时存在
    cadence: Option<Interval>,
    finish_poll: Option<Interval>,
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn delayed_interval(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl TypewriterActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RenderCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                _ = next_tick(&mut self.cadence) => self.on_tick(),
                _ = next_tick(&mut self.finish_poll) => self.on_finish_poll(),
            }
        }
        debug!("[TranslationPanel] 渲染任务退出");
    }

    fn apply(&mut self, command: RenderCommand) {
        let generation = command.generation();
        if generation < self.state.generation() {
            debug!(
                "[TranslationPanel] 丢弃过期指令 generation={} current={}",
                generation,
                self.state.generation()
            );
            return;
        }
        if generation > self.state.generation() {
            // 新请求抢占旧请求
            self.stop_timers();
            self.state.begin(generation);
        }

        match command {
            RenderCommand::Show { anchor, .. } => {
                self.stop_timers();
                self.state.reset();
                let size = self.presenter.bounding_box().size;
                let position = initial_position(anchor, size, self.presenter.viewport());
                self.presenter.show(position);
            }
            RenderCommand::SetLoading { streaming, .. } => {
                self.render(PanelView::Loading { streaming });
            }
            RenderCommand::Enqueue { fragment, .. } => {
                let cold_start = self.state.phase() == RenderPhase::Idle;
                if !self.state.enqueue(&fragment) {
                    debug!("[TranslationPanel] 已完成，忽略迟到片段");
                    return;
                }
                if cold_start {
                    self.render(PanelView::Streaming {
                        text: String::new(),
                    });
                }
                if self.cadence.is_none() && self.state.has_pending() {
                    self.cadence = Some(delayed_interval(self.config.interval));
                }
            }
            RenderCommand::Finish {
                result,
                show_pronunciation,
                ..
            } => {
                if !self
                    .state
                    .finish(FinalView::from_result(&result, show_pronunciation))
                {
                    debug!("[TranslationPanel] 重复的完成指令，忽略");
                    return;
                }
                if !self.try_complete() && self.finish_poll.is_none() {
                    self.finish_poll = Some(delayed_interval(self.config.finish_poll));
                }
            }
            RenderCommand::Immediate {
                result,
                show_pronunciation,
                ..
            } => {
                self.stop_timers();
                self.state.seal();
                let view = FinalView::from_result(&result, show_pronunciation);
                self.render(PanelView::Final {
                    text: view.text,
                    pronunciation: view.pronunciation,
                });
            }
            RenderCommand::Error { message, .. } => {
                self.stop_timers();
                self.state.seal();
                self.render(PanelView::Error { message });
            }
            RenderCommand::Hide { .. } => {
                self.stop_timers();
                self.state.reset();
                self.presenter.hide();
            }
        }
    }

    fn on_tick(&mut self) {
        if self.state.tick() {
            self.render(PanelView::Streaming {
                text: self.state.displayed().to_string(),
            });
        }
        if !self.state.has_pending() {
            // 暂停节拍，下次入队时重新启动
            self.cadence = None;
        }
    }

    fn on_finish_poll(&mut self) {
        if self.try_complete() {
            self.finish_poll = None;
        }
    }

    fn try_complete(&mut self) -> bool {
        let Some(view) = self.state.take_final() else {
            return false;
        };
        self.stop_timers();
        self.render(PanelView::Final {
            text: view.text,
            pronunciation: view.pronunciation,
        });
        true
    }

    fn stop_timers(&mut self) {
        self.cadence = None;
        self.finish_poll = None;
    }

    /// 渲染后重新收回视口，防止文本增长溢出屏幕
    fn render(&mut self, view: PanelView) {
        self.presenter.render(&view);
        let rect = self.presenter.bounding_box();
        if let Some(position) = clamp_to_viewport(rect, self.presenter.viewport()) {
            self.presenter.move_to(position);
        }
    }
}
