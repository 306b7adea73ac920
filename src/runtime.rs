//! 进程内装配：后台上下文 + 若干标签页上下文，全部运行在同一个 tokio 运行时中

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::panel::content::ContentScript;
use crate::panel::presenter::OverlayPresenter;
use crate::panel::typewriter::{TypewriterConfig, TypewriterHandle};
use crate::relay::background::BackgroundService;
use crate::relay::messages::TabId;
use crate::relay::router::{runtime_channel, RuntimeClient, RuntimeConnector, TabRouter};
use crate::relay::CrossContextRelay;
use crate::settings::{ExtensionSettings, SettingsManager};
use crate::translation::TranslationService;

pub struct ExtensionRuntime {
    settings: ExtensionSettings,
    router: Arc<TabRouter>,
    connector: RuntimeConnector,
    background: Arc<BackgroundService>,
    tasks: Vec<JoinHandle<()>>,
}

impl ExtensionRuntime {
    pub fn start(settings: ExtensionSettings) -> Self {
        let translator = TranslationService::from_settings(&settings);
        Self::start_with(settings, translator)
    }

    pub fn start_with(settings: ExtensionSettings, translator: TranslationService) -> Self {
        let router = TabRouter::new();
        let relay = Arc::new(CrossContextRelay::new(router.clone()));
        let background = Arc::new(BackgroundService::new(
            Arc::new(translator),
            Arc::new(SettingsManager::new(settings.clone())),
            relay,
        ));
        let (connector, requests) = runtime_channel();
        let serve = background.clone().serve(requests);
        info!(
            "[Runtime] 扩展已启动 - 翻译服务: {}, 目标语言: {}",
            settings.translation_service, settings.target_language
        );

        Self {
            settings,
            router,
            connector,
            background,
            tasks: vec![serve],
        }
    }

    /// 打开一个标签页并注入内容脚本
    pub fn open_tab(&mut self, tab_id: TabId, presenter: Box<dyn OverlayPresenter>) -> Arc<ContentScript> {
        let port = self.router.connect(tab_id);
        let (renderer, render_task) =
            TypewriterHandle::spawn(presenter, TypewriterConfig::from_settings(&self.settings));
        let content = ContentScript::new(
            tab_id,
            self.connector.client(Some(tab_id)),
            renderer,
            self.settings.clone(),
        );
        let listener = content.spawn_listener(port);
        self.tasks.push(render_task);
        self.tasks.push(listener);
        content
    }

    pub fn close_tab(&self, tab_id: TabId) {
        self.router.disconnect(tab_id);
    }

    /// 弹窗等非标签页上下文使用的客户端
    pub fn popup_client(&self) -> RuntimeClient {
        self.connector.client(None)
    }

    pub fn background(&self) -> &Arc<BackgroundService> {
        &self.background
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("[Runtime] 扩展已停止");
    }
}
