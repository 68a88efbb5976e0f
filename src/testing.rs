//! In-memory scripted page used by the unit tests.
//!
//! A [`FakePage`] holds named screens. Each screen maps a [`CandidateQuery`]
//! (compared structurally) to the nodes it matches. Clicks and key presses can
//! switch screens or change the URL, which is enough to walk the wizard, the
//! dialogs and the login redirects without a browser.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Verbosity;
use crate::driver::{ClickOptions, DriverError, PageDriver};
use crate::locator::{CandidateQuery, Element};
use crate::logging::{Decision, E2eLogger};
use crate::session::StorageState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Replace the current screen.
    Show(String),
    /// Change the URL and, optionally, the screen.
    Navigate { url: String, screen: Option<String> },
}

#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    pub visible: bool,
    pub enabled: bool,
    pub detached: bool,
    pub fail_visibility: bool,
    pub fail_click: bool,
    pub checkable: bool,
    pub checked: bool,
    pub attrs: HashMap<String, String>,
    pub value: String,
    pub max_length: Option<usize>,
    pub options: Vec<String>,
    pub on_click: Option<Reaction>,
}

impl FakeNode {
    pub fn visible() -> Self {
        Self {
            visible: true,
            enabled: true,
            ..Default::default()
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            enabled: true,
            ..Default::default()
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Visibility checks on this node raise a script error.
    pub fn failing(mut self) -> Self {
        self.fail_visibility = true;
        self
    }

    pub fn click_fails(mut self) -> Self {
        self.fail_click = true;
        self
    }

    pub fn checkable(mut self, checked: bool) -> Self {
        self.checkable = true;
        self.checked = checked;
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn max_length(mut self, limit: usize) -> Self {
        self.max_length = Some(limit);
        self
    }

    pub fn options(mut self, labels: &[&str]) -> Self {
        self.options = labels.iter().map(|label| label.to_string()).collect();
        self
    }

    pub fn on_click(mut self, reaction: Reaction) -> Self {
        self.on_click = Some(reaction);
        self
    }

    pub fn shows(self, screen: &str) -> Self {
        self.on_click(Reaction::Show(screen.to_string()))
    }
}

type Screen = Vec<(CandidateQuery, Vec<FakeNode>)>;

#[derive(Default)]
struct State {
    url: String,
    current: String,
    screens: HashMap<String, Screen>,
    routes: Vec<(String, String, String)>,
    keys: HashMap<(String, String), Reaction>,
    actions: Vec<String>,
    storage: Option<StorageState>,
}

impl State {
    fn nodes(&self, query: &CandidateQuery) -> Option<&Vec<FakeNode>> {
        self.screens
            .get(&self.current)?
            .iter()
            .find(|(candidate, _)| candidate == query)
            .map(|(_, nodes)| nodes)
    }

    fn node(&self, element: &Element) -> Option<&FakeNode> {
        self.nodes(element.query())?.get(element.index)
    }

    fn node_mut(&mut self, element: &Element) -> Option<&mut FakeNode> {
        self.screens
            .get_mut(&self.current)?
            .iter_mut()
            .find(|(candidate, _)| candidate == element.query())
            .and_then(|(_, nodes)| nodes.get_mut(element.index))
    }

    fn attached(&self, element: &Element) -> Result<&FakeNode, DriverError> {
        match self.node(element) {
            Some(node) if !node.detached => Ok(node),
            _ => Err(DriverError::Detached(element.to_string())),
        }
    }

    fn react(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::Show(screen) => self.current = screen,
            Reaction::Navigate { url, screen } => {
                self.url = url;
                if let Some(screen) = screen {
                    self.current = screen;
                }
            }
        }
    }
}

pub struct FakePage {
    state: Mutex<State>,
    logger: E2eLogger,
    decisions: Arc<Mutex<Vec<Decision>>>,
}

pub struct ScreenBuilder<'a> {
    page: &'a FakePage,
    name: String,
}

impl ScreenBuilder<'_> {
    /// Append `node` to the matches of `query` on this screen.
    pub fn add(self, query: CandidateQuery, node: FakeNode) -> Self {
        {
            let mut state = self.page.state.lock().unwrap();
            let screen = state.screens.entry(self.name.clone()).or_default();
            match screen.iter_mut().find(|(candidate, _)| *candidate == query) {
                Some((_, nodes)) => nodes.push(node),
                None => screen.push((query, vec![node])),
            }
        }
        self
    }

    pub fn on_key(self, key: &str, reaction: Reaction) -> Self {
        self.page
            .state
            .lock()
            .unwrap()
            .keys
            .insert((self.name.clone(), key.to_string()), reaction);
        self
    }
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        let decisions = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&decisions);
        let logger = E2eLogger::new(Verbosity::Detailed).with_tap(Arc::new(
            move |decision: &Decision| capture.lock().unwrap().push(decision.clone()),
        ));

        Self {
            state: Mutex::new(State {
                url: url.to_string(),
                ..Default::default()
            }),
            logger,
            decisions,
        }
    }

    pub fn screen(&self, name: &str) -> ScreenBuilder<'_> {
        self.state
            .lock()
            .unwrap()
            .screens
            .entry(name.to_string())
            .or_default();
        ScreenBuilder {
            page: self,
            name: name.to_string(),
        }
    }

    pub fn show(&self, name: &str) {
        self.state.lock().unwrap().current = name.to_string();
    }

    /// `goto` on a URL ending in `path` lands on `landed_url` showing `screen`.
    pub fn route(&self, path: &str, landed_url: &str, screen: &str) {
        self.state.lock().unwrap().routes.push((
            path.to_string(),
            landed_url.to_string(),
            screen.to_string(),
        ));
    }

    pub fn current_screen(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn did(&self, action: &str) -> bool {
        self.actions().iter().any(|entry| entry == action)
    }

    pub fn value_of(&self, element: &Element) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.node(element).map(|node| node.value.clone())
    }

    pub fn stored_state(&self) -> Option<StorageState> {
        self.state.lock().unwrap().storage.clone()
    }

    /// Messages logged through the page's logger, oldest first.
    pub fn log_messages(&self) -> Vec<String> {
        self.decisions
            .lock()
            .unwrap()
            .iter()
            .map(|decision| decision.message.clone())
            .collect()
    }

    fn record(&self, action: String) {
        self.state.lock().unwrap().actions.push(action);
    }
}

#[async_trait]
impl PageDriver for FakePage {
    fn logger(&self) -> &E2eLogger {
        &self.logger
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("goto {url}"));
        let route = state
            .routes
            .iter()
            .find(|(path, _, _)| url.ends_with(path.as_str()))
            .cloned();
        match route {
            Some((_, landed, screen)) => {
                state.url = landed;
                state.current = screen;
            }
            None => state.url = url.to_string(),
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn count(&self, query: &CandidateQuery) -> Result<usize, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(state.nodes(query).map(Vec::len).unwrap_or(0))
    }

    async fn is_visible(&self, element: &Element) -> Result<bool, DriverError> {
        let state = self.state.lock().unwrap();
        match state.node(element) {
            None => Ok(false),
            Some(node) if node.fail_visibility => {
                Err(DriverError::Script(format!("{element} threw")))
            }
            Some(node) if node.detached => Err(DriverError::Detached(element.to_string())),
            Some(node) => Ok(node.visible),
        }
    }

    async fn is_enabled(&self, element: &Element) -> Result<bool, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(state.attached(element)?.enabled)
    }

    async fn is_checked(&self, element: &Element) -> Result<bool, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(state.attached(element)?.checked)
    }

    async fn attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(state.attached(element)?.attrs.get(name).cloned())
    }

    async fn input_value(&self, element: &Element) -> Result<String, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(state.attached(element)?.value.clone())
    }

    async fn click(&self, element: &Element, options: ClickOptions) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let node = state.attached(element)?;
        if node.fail_click {
            return Err(DriverError::Script(format!("click on {element} failed")));
        }
        let reaction = node.on_click.clone();
        let verb = if options.force { "force-click" } else { "click" };
        state.actions.push(format!("{verb} {element}"));
        if let Some(node) = state.node_mut(element) {
            if node.checkable {
                node.checked = !node.checked;
            }
        }
        if let Some(reaction) = reaction {
            state.react(reaction);
        }
        Ok(())
    }

    async fn check(&self, element: &Element) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let node = state.attached(element)?;
        if !node.checkable {
            return Err(DriverError::NotCheckable(element.to_string()));
        }
        let reaction = node.on_click.clone();
        state.actions.push(format!("check {element}"));
        if let Some(node) = state.node_mut(element) {
            node.checked = true;
        }
        if let Some(reaction) = reaction {
            state.react(reaction);
        }
        Ok(())
    }

    async fn fill(&self, element: &Element, value: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.attached(element)?;
        state.actions.push(format!("fill {element}"));
        if let Some(node) = state.node_mut(element) {
            node.value = match node.max_length {
                Some(limit) => value.chars().take(limit).collect(),
                None => value.to_string(),
            };
        }
        Ok(())
    }

    async fn select_option(&self, element: &Element, label: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let node = state.attached(element)?;
        if !node.options.iter().any(|option| option == label) {
            return Err(DriverError::Message(format!(
                "no option '{label}' in {element}"
            )));
        }
        state.actions.push(format!("select {element} = {label}"));
        Ok(())
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.attached(element)?;
        state.actions.push(format!("scroll {element}"));
        Ok(())
    }

    async fn set_input_files(
        &self,
        element: &Element,
        files: &[PathBuf],
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.attached(element)?;
        let names: Vec<String> = files
            .iter()
            .map(|file| file.display().to_string())
            .collect();
        state
            .actions
            .push(format!("upload {element} <- {}", names.join(",")));
        Ok(())
    }

    async fn press(&self, element: Option<&Element>, key: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        match element {
            Some(element) => {
                state.attached(element)?;
                state.actions.push(format!("press {element} {key}"));
            }
            None => state.actions.push(format!("press {key}")),
        }
        let reaction = state
            .keys
            .get(&(state.current.clone(), key.to_string()))
            .cloned();
        if let Some(reaction) = reaction {
            state.react(reaction);
        }
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), DriverError> {
        self.record("scroll-bottom".to_string());
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.record(format!("mouse {x},{y}"));
        Ok(())
    }

    async fn export_storage_state(&self) -> Result<StorageState, DriverError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .storage
            .clone()
            .unwrap_or_default())
    }

    async fn import_storage_state(&self, snapshot: &StorageState) -> Result<(), DriverError> {
        self.state.lock().unwrap().storage = Some(snapshot.clone());
        Ok(())
    }
}
