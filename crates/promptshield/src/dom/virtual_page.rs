use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot, Notify};
use tracing::trace;

use super::selector::{ElementTree, SelectorList};
use super::{
    Decision, DispatchOutcome, DomEvent, ElementId, EventListener, Mutation, Page, Platform,
    PromptHandle, PromptId, PromptView,
};
use crate::error::{Error, Result};

const MUTATION_CAPACITY: usize = 256;

const FORM_CONTROLS: &[&str] = &["textarea", "input"];

/// Blueprint for an element subtree to insert into a [`VirtualPage`].
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    value: Option<String>,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    /// Start a spec for a `tag` element.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Set the `id` attribute.
    #[must_use]
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Add a class to the `class` attribute.
    #[must_use]
    pub fn class(mut self, class: &str) -> Self {
        if let Some((_, classes)) = self.attributes.iter_mut().find(|(k, _)| k == "class") {
            classes.push(' ');
            classes.push_str(class);
            return self;
        }
        self.attr("class", class)
    }

    /// Set an attribute.
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        self.attributes.retain(|(k, _)| *k != name);
        self.attributes.push((name, value.to_string()));
        self
    }

    /// Set the element's own text.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Set the form-control value.
    #[must_use]
    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// Append a child element.
    #[must_use]
    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// A default action the page performed because no listener prevented it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Element the event was dispatched at.
    pub target: ElementId,
    /// Event type.
    pub event: String,
}

/// The input and send control of a rendered chat form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatElements {
    /// Message input.
    pub input: ElementId,
    /// Send control.
    pub submit: ElementId,
}

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    value: Option<String>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

struct OpenPrompt {
    view: PromptView,
    responder: Option<oneshot::Sender<Decision>>,
}

struct Document {
    hostname: String,
    root: ElementId,
    body: ElementId,
    nodes: HashMap<ElementId, Node>,
    listeners: HashMap<ElementId, Vec<(String, Arc<dyn EventListener>)>>,
    prompts: BTreeMap<PromptId, OpenPrompt>,
    activations: Vec<Activation>,
    next_element: u64,
    next_prompt: u64,
}

impl ElementTree for Document {
    fn tag_name(&self, element: ElementId) -> Option<&str> {
        self.nodes.get(&element).map(|n| n.tag.as_str())
    }

    fn attribute(&self, element: ElementId, name: &str) -> Option<&str> {
        self.nodes
            .get(&element)?
            .attributes
            .get(name)
            .map(String::as_str)
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.nodes.get(&element)?.parent
    }

    fn children(&self, element: ElementId) -> &[ElementId] {
        self.nodes
            .get(&element)
            .map_or(&[] as &[ElementId], |n| n.children.as_slice())
    }
}

impl Document {
    fn node(&self, element: ElementId) -> Result<&Node> {
        self.nodes
            .get(&element)
            .ok_or(Error::ElementDetached(element))
    }

    fn node_mut(&mut self, element: ElementId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&element)
            .ok_or(Error::ElementDetached(element))
    }

    fn insert(&mut self, parent: ElementId, spec: ElementSpec) -> ElementId {
        self.next_element += 1;
        let id = ElementId::new(self.next_element);
        let value = spec.value.or_else(|| {
            FORM_CONTROLS
                .contains(&spec.tag.as_str())
                .then(String::new)
        });
        self.nodes.insert(
            id,
            Node {
                tag: spec.tag,
                attributes: spec.attributes.into_iter().collect(),
                text: spec.text,
                value,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.push(id);
        }
        for child in spec.children {
            self.insert(id, child);
        }
        id
    }

    fn detach(&mut self, element: ElementId) {
        let Some(node) = self.nodes.remove(&element) else {
            return;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != element);
        }
        let mut stack = node.children;
        self.listeners.remove(&element);
        while let Some(descendant) = stack.pop() {
            if let Some(node) = self.nodes.remove(&descendant) {
                stack.extend(node.children);
            }
            self.listeners.remove(&descendant);
        }
    }

    fn clear_children(&mut self, element: ElementId) -> Result<Vec<ElementId>> {
        let children = std::mem::take(&mut self.node_mut(element)?.children);
        for child in &children {
            self.detach(*child);
        }
        Ok(children)
    }

    fn text_of(&self, element: ElementId) -> String {
        let mut text = String::new();
        let mut stack = vec![element];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                text.push_str(&node.text);
                stack.extend(node.children.iter().rev());
            }
        }
        text
    }
}

/// An in-memory page.
///
/// It models the subset of browser behavior the engine relies on: a
/// document tree queried with selectors, form values and text, bubbling
/// event dispatch with default actions, mutation notifications and overlay
/// prompts that a test (or the CLI) answers on the user's behalf.
pub struct VirtualPage {
    document: Mutex<Document>,
    mutations: broadcast::Sender<Mutation>,
    prompt_opened: Notify,
}

impl std::fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let doc = self.doc();
        f.debug_struct("VirtualPage")
            .field("hostname", &doc.hostname)
            .field("elements", &doc.nodes.len())
            .field("prompts", &doc.prompts.len())
            .finish_non_exhaustive()
    }
}

impl VirtualPage {
    /// Create an empty page (`<html><body></body></html>`) at `hostname`.
    #[must_use]
    pub fn new(hostname: &str) -> Self {
        let root = ElementId::new(1);
        let body = ElementId::new(2);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                tag: "html".to_string(),
                attributes: BTreeMap::new(),
                text: String::new(),
                value: None,
                parent: None,
                children: vec![body],
            },
        );
        nodes.insert(
            body,
            Node {
                tag: "body".to_string(),
                attributes: BTreeMap::new(),
                text: String::new(),
                value: None,
                parent: Some(root),
                children: Vec::new(),
            },
        );

        let (mutations, _) = broadcast::channel(MUTATION_CAPACITY);
        Self {
            document: Mutex::new(Document {
                hostname: hostname.to_string(),
                root,
                body,
                nodes,
                listeners: HashMap::new(),
                prompts: BTreeMap::new(),
                activations: Vec::new(),
                next_element: 2,
                next_prompt: 0,
            }),
            mutations,
            prompt_opened: Notify::new(),
        }
    }

    fn doc(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, mutation: Mutation) {
        // No subscribers is fine.
        let _ = self.mutations.send(mutation);
    }

    /// The `<body>` element.
    #[must_use]
    pub fn body(&self) -> ElementId {
        self.doc().body
    }

    /// Insert `spec` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` is detached.
    pub fn append(&self, parent: ElementId, spec: ElementSpec) -> Result<ElementId> {
        let id = {
            let mut doc = self.doc();
            doc.node(parent)?;
            doc.insert(parent, spec)
        };
        self.emit(Mutation::ChildList {
            added: vec![id],
            removed: Vec::new(),
        });
        Ok(id)
    }

    /// Render a minimal chat form the way `platform` marks it up, with
    /// `text` already in the input.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is detached.
    pub fn render_chat(&self, platform: Platform, text: &str) -> Result<ChatElements> {
        let (input, submit) = match platform {
            Platform::ChatGpt => (
                ElementSpec::new("textarea").id("prompt-textarea").value(text),
                ElementSpec::new("button").attr("data-testid", "send-button"),
            ),
            Platform::Claude => (
                text.split('\n').fold(
                    ElementSpec::new("div")
                        .class("ProseMirror")
                        .attr("contenteditable", "true"),
                    |editor, line| editor.child(ElementSpec::new("p").text(line)),
                ),
                ElementSpec::new("button")
                    .attr("aria-label", "Send message")
                    .child(ElementSpec::new("svg")),
            ),
            Platform::Gemini => (
                ElementSpec::new("textarea")
                    .attr("aria-label", "Input box")
                    .value(text),
                ElementSpec::new("button").attr("aria-label", "Send message"),
            ),
        };
        let form = self.append(self.body(), ElementSpec::new("form"))?;
        Ok(ChatElements {
            input: self.append(form, input)?,
            submit: self.append(form, submit)?,
        })
    }

    /// Remove an element and its subtree.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is already detached.
    pub fn remove(&self, element: ElementId) -> Result<()> {
        {
            let mut doc = self.doc();
            doc.node(element)?;
            doc.detach(element);
        }
        self.emit(Mutation::ChildList {
            added: Vec::new(),
            removed: vec![element],
        });
        Ok(())
    }

    /// Move to a new location.
    ///
    /// The document is kept; subscribers are told about the navigation.
    pub fn navigate(&self, hostname: &str) {
        self.doc().hostname = hostname.to_string();
        self.emit(Mutation::Navigated {
            hostname: hostname.to_string(),
        });
    }

    /// Set a form value and fire `input`, as a user typing would.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is detached or not a form control.
    pub async fn type_text(&self, element: ElementId, text: &str) -> Result<DispatchOutcome> {
        self.set_value(element, text)?;
        self.dispatch(element, "input").await
    }

    /// Default actions performed so far.
    #[must_use]
    pub fn activations(&self) -> Vec<Activation> {
        self.doc().activations.clone()
    }

    /// How many times `event` reached its default action on `target`.
    #[must_use]
    pub fn activation_count(&self, target: ElementId, event: &str) -> usize {
        self.doc()
            .activations
            .iter()
            .filter(|a| a.target == target && a.event == event)
            .count()
    }

    /// Number of listeners registered for `event` on `element`.
    #[must_use]
    pub fn listener_count(&self, element: ElementId, event: &str) -> usize {
        self.doc()
            .listeners
            .get(&element)
            .map_or(0, |l| l.iter().filter(|(name, _)| name == event).count())
    }

    /// Number of prompts currently displayed.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.doc().prompts.len()
    }

    /// The oldest displayed prompt that has not been answered.
    #[must_use]
    pub fn pending_prompt(&self) -> Option<(PromptId, PromptView)> {
        self.doc()
            .prompts
            .iter()
            .find(|(_, p)| p.responder.is_some())
            .map(|(id, p)| (*id, p.view.clone()))
    }

    /// Wait until an unanswered prompt is displayed.
    pub async fn wait_for_prompt(&self) -> (PromptId, PromptView) {
        loop {
            let opened = self.prompt_opened.notified();
            if let Some(prompt) = self.pending_prompt() {
                return prompt;
            }
            opened.await;
        }
    }

    /// Answer a prompt on the user's behalf.
    ///
    /// Returns `false` if the prompt is gone or was already answered.
    pub fn respond(&self, id: PromptId, decision: Decision) -> bool {
        let responder = self
            .doc()
            .prompts
            .get_mut(&id)
            .and_then(|p| p.responder.take());
        responder.is_some_and(|tx| tx.send(decision).is_ok())
    }
}

#[async_trait]
impl Page for VirtualPage {
    fn hostname(&self) -> String {
        self.doc().hostname.clone()
    }

    fn query_selector(&self, selector: &str) -> Result<Option<ElementId>> {
        let list = SelectorList::parse(selector)?;
        let doc = self.doc();
        Ok(list.select_first(&*doc, doc.root))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>> {
        let list = SelectorList::parse(selector)?;
        let doc = self.doc();
        Ok(list.select_all(&*doc, doc.root))
    }

    fn is_connected(&self, element: ElementId) -> bool {
        self.doc().nodes.contains_key(&element)
    }

    fn value(&self, element: ElementId) -> Result<Option<String>> {
        Ok(self.doc().node(element)?.value.clone())
    }

    fn set_value(&self, element: ElementId, value: &str) -> Result<()> {
        let mut doc = self.doc();
        let node = doc.node_mut(element)?;
        match &mut node.value {
            Some(current) => {
                *current = value.to_string();
                Ok(())
            }
            None => Err(Error::dom(format!(
                "element {element} <{}> has no value",
                node.tag
            ))),
        }
    }

    fn text_content(&self, element: ElementId) -> Result<String> {
        let doc = self.doc();
        doc.node(element)?;
        Ok(doc.text_of(element))
    }

    fn set_text_content(&self, element: ElementId, text: &str) -> Result<()> {
        let removed = {
            let mut doc = self.doc();
            let removed = doc.clear_children(element)?;
            doc.node_mut(element)?.text = text.to_string();
            removed
        };
        if !removed.is_empty() {
            self.emit(Mutation::ChildList {
                added: Vec::new(),
                removed,
            });
        }
        self.emit(Mutation::CharacterData { target: element });
        Ok(())
    }

    fn paragraphs(&self, element: ElementId) -> Result<Vec<String>> {
        let doc = self.doc();
        doc.node(element)?;
        let list = SelectorList::parse("p")?;
        let paragraphs = list
            .select_all(&*doc, element)
            .into_iter()
            .filter(|p| *p != element)
            .map(|p| doc.text_of(p))
            .collect();
        Ok(paragraphs)
    }

    fn set_paragraphs(&self, element: ElementId, lines: &[String]) -> Result<()> {
        let (added, removed) = {
            let mut doc = self.doc();
            let removed = doc.clear_children(element)?;
            doc.node_mut(element)?.text.clear();
            let added: Vec<ElementId> = lines
                .iter()
                .map(|line| doc.insert(element, ElementSpec::new("p").text(line)))
                .collect();
            (added, removed)
        };
        self.emit(Mutation::ChildList { added, removed });
        Ok(())
    }

    fn attribute(&self, element: ElementId, name: &str) -> Result<Option<String>> {
        Ok(self
            .doc()
            .node(element)?
            .attributes
            .get(&name.to_ascii_lowercase())
            .cloned())
    }

    fn set_attribute(&self, element: ElementId, name: &str, value: &str) -> Result<()> {
        let name = name.to_ascii_lowercase();
        self.doc()
            .node_mut(element)?
            .attributes
            .insert(name.clone(), value.to_string());
        self.emit(Mutation::Attributes {
            target: element,
            name,
        });
        Ok(())
    }

    fn remove_attribute(&self, element: ElementId, name: &str) -> Result<bool> {
        let name = name.to_ascii_lowercase();
        let removed = self
            .doc()
            .node_mut(element)?
            .attributes
            .remove(&name)
            .is_some();
        if removed {
            self.emit(Mutation::Attributes {
                target: element,
                name,
            });
        }
        Ok(removed)
    }

    fn add_event_listener(
        &self,
        element: ElementId,
        event: &str,
        listener: Arc<dyn EventListener>,
    ) -> Result<()> {
        let mut doc = self.doc();
        doc.node(element)?;
        doc.listeners
            .entry(element)
            .or_default()
            .push((event.to_string(), listener));
        Ok(())
    }

    fn remove_event_listener(
        &self,
        element: ElementId,
        event: &str,
        listener: &Arc<dyn EventListener>,
    ) -> Result<bool> {
        let mut doc = self.doc();
        doc.node(element)?;
        let Some(registered) = doc.listeners.get_mut(&element) else {
            return Ok(false);
        };
        let target = Arc::as_ptr(listener).cast::<()>();
        let before = registered.len();
        registered.retain(|(name, existing)| {
            name != event || Arc::as_ptr(existing).cast::<()>() != target
        });
        Ok(registered.len() != before)
    }

    fn observe(&self) -> broadcast::Receiver<Mutation> {
        self.mutations.subscribe()
    }

    fn show_prompt(&self, anchor: ElementId, view: PromptView) -> Result<PromptHandle> {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut doc = self.doc();
            doc.node(anchor)?;
            doc.next_prompt += 1;
            let id = PromptId::new(doc.next_prompt);
            doc.prompts.insert(
                id,
                OpenPrompt {
                    view,
                    responder: Some(tx),
                },
            );
            id
        };
        trace!(%id, %anchor, "Prompt shown");
        self.prompt_opened.notify_waiters();
        Ok(PromptHandle { id, decision: rx })
    }

    fn remove_prompt(&self, id: PromptId) {
        if self.doc().prompts.remove(&id).is_some() {
            trace!(%id, "Prompt removed");
        }
    }

    async fn dispatch(&self, target: ElementId, event: &str) -> Result<DispatchOutcome> {
        // Listeners along the bubbling path, grouped per element.
        let path: Vec<Vec<Arc<dyn EventListener>>> = {
            let doc = self.doc();
            doc.node(target)?;
            let mut path = Vec::new();
            let mut current = Some(target);
            while let Some(element) = current {
                let listeners = doc
                    .listeners
                    .get(&element)
                    .map(|l| {
                        l.iter()
                            .filter(|(name, _)| name == event)
                            .map(|(_, listener)| Arc::clone(listener))
                            .collect()
                    })
                    .unwrap_or_default();
                path.push(listeners);
                current = doc.parent(element);
            }
            path
        };

        let dom_event = DomEvent::new(event, target);
        let mut listeners_run = 0;
        for listeners in path {
            for listener in listeners {
                listener.handle_event(&dom_event).await;
                listeners_run += 1;
            }
            if dom_event.is_propagation_stopped() {
                break;
            }
        }

        let default_prevented = dom_event.is_default_prevented();
        if !default_prevented {
            self.doc().activations.push(Activation {
                target,
                event: event.to_string(),
            });
        }
        Ok(DispatchOutcome {
            default_prevented,
            listeners_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        calls: AtomicUsize,
        prevent: bool,
        stop: bool,
    }

    impl Counter {
        fn new(prevent: bool, stop: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                prevent,
                stop,
            })
        }
    }

    #[async_trait]
    impl EventListener for Counter {
        async fn handle_event(&self, event: &DomEvent) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.prevent {
                event.prevent_default();
            }
            if self.stop {
                event.stop_propagation();
            }
        }
    }

    fn chat_page() -> (VirtualPage, ElementId, ElementId) {
        let page = VirtualPage::new("chatgpt.com");
        let form = page.append(page.body(), ElementSpec::new("form")).unwrap();
        let input = page
            .append(form, ElementSpec::new("textarea").id("prompt-textarea"))
            .unwrap();
        let button = page
            .append(
                form,
                ElementSpec::new("button").attr("data-testid", "send-button"),
            )
            .unwrap();
        (page, input, button)
    }

    #[test]
    fn test_query_selector() {
        let (page, input, button) = chat_page();
        assert_eq!(page.query_selector("#prompt-textarea").unwrap(), Some(input));
        assert_eq!(
            page.query_selector(r#"button[data-testid="send-button"]"#)
                .unwrap(),
            Some(button)
        );
        assert_eq!(page.query_selector("form > *").unwrap(), Some(input));
        assert_eq!(page.query_selector_all("form > *").unwrap(), vec![input, button]);
        assert!(page.query_selector("[").is_err());
    }

    #[test]
    fn test_value_and_text() {
        let (page, input, button) = chat_page();
        assert_eq!(page.value(input).unwrap().as_deref(), Some(""));
        assert_eq!(page.value(button).unwrap(), None);

        page.set_value(input, "hi").unwrap();
        assert_eq!(page.value(input).unwrap().as_deref(), Some("hi"));
        assert!(page.set_value(button, "x").is_err());
    }

    #[test]
    fn test_text_content_concatenates_descendants() {
        let page = VirtualPage::new("claude.ai");
        let editor = page
            .append(
                page.body(),
                ElementSpec::new("div")
                    .text("a")
                    .child(ElementSpec::new("p").text("b"))
                    .child(ElementSpec::new("p").text("c")),
            )
            .unwrap();
        assert_eq!(page.text_content(editor).unwrap(), "abc");
        assert_eq!(page.paragraphs(editor).unwrap(), vec!["b", "c"]);

        page.set_text_content(editor, "z").unwrap();
        assert_eq!(page.text_content(editor).unwrap(), "z");
        assert!(page.paragraphs(editor).unwrap().is_empty());
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let (page, input, _) = chat_page();
        let form = page.query_selector("form").unwrap().unwrap();
        page.remove(form).unwrap();

        assert!(!page.is_connected(form));
        assert!(!page.is_connected(input));
        assert!(matches!(page.value(input), Err(Error::ElementDetached(_))));
        assert!(page.remove(form).is_err());
    }

    #[test]
    fn test_mutations_are_broadcast() {
        let (page, input, _) = chat_page();
        let mut rx = page.observe();

        page.set_attribute(input, "data-x", "1").unwrap();
        page.navigate("claude.ai");

        assert_eq!(
            rx.try_recv().unwrap(),
            Mutation::Attributes {
                target: input,
                name: "data-x".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Mutation::Navigated {
                hostname: "claude.ai".to_string()
            }
        );
        assert_eq!(page.hostname(), "claude.ai");
    }

    #[tokio::test]
    async fn test_dispatch_runs_default_action() {
        let (page, _, button) = chat_page();
        let counter = Counter::new(false, false);
        page.add_event_listener(button, "click", counter.clone()).unwrap();

        let outcome = page.dispatch(button, "click").await.unwrap();
        assert!(!outcome.default_prevented);
        assert_eq!(outcome.listeners_run, 1);
        assert_eq!(page.activation_count(button, "click"), 1);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prevent_default_suppresses_action() {
        let (page, _, button) = chat_page();
        page.add_event_listener(button, "click", Counter::new(true, false))
            .unwrap();

        let outcome = page.dispatch(button, "click").await.unwrap();
        assert!(outcome.default_prevented);
        assert_eq!(page.activation_count(button, "click"), 0);
    }

    #[tokio::test]
    async fn test_event_bubbles_until_stopped() {
        let (page, _, button) = chat_page();
        let form = page.query_selector("form").unwrap().unwrap();
        let on_form = Counter::new(false, false);
        let on_body = Counter::new(false, false);
        page.add_event_listener(form, "click", on_form.clone()).unwrap();
        page.add_event_listener(page.body(), "click", on_body.clone())
            .unwrap();

        page.dispatch(button, "click").await.unwrap();
        assert_eq!(on_form.calls.load(Ordering::SeqCst), 1);
        assert_eq!(on_body.calls.load(Ordering::SeqCst), 1);

        page.add_event_listener(button, "click", Counter::new(false, true))
            .unwrap();
        page.dispatch(button, "click").await.unwrap();
        assert_eq!(on_form.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_on_detached_element_fails() {
        let (page, _, button) = chat_page();
        page.remove(button).unwrap();
        assert!(page.dispatch(button, "click").await.is_err());
    }

    #[tokio::test]
    async fn test_prompt_lifecycle() {
        let (page, input, _) = chat_page();
        let view = PromptView {
            title: "t".to_string(),
            message: "m".to_string(),
            categories: Vec::new(),
            keep_label: "Keep".to_string(),
            remove_label: "Remove".to_string(),
        };

        let handle = page.show_prompt(input, view.clone()).unwrap();
        let (id, shown) = page.wait_for_prompt().await;
        assert_eq!(id, handle.id);
        assert_eq!(shown, view);

        assert!(page.respond(id, Decision::Proceed));
        assert!(!page.respond(id, Decision::Redact));
        assert_eq!(handle.decision.await.unwrap(), Decision::Proceed);
        assert!(page.pending_prompt().is_none());
        assert_eq!(page.prompt_count(), 1);

        page.remove_prompt(id);
        assert_eq!(page.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_removed_prompt_drops_decision() {
        let (page, input, _) = chat_page();
        let handle = page
            .show_prompt(
                input,
                PromptView {
                    title: String::new(),
                    message: String::new(),
                    categories: Vec::new(),
                    keep_label: String::new(),
                    remove_label: String::new(),
                },
            )
            .unwrap();
        page.remove_prompt(handle.id);
        assert!(handle.decision.await.is_err());
    }

    #[test]
    fn test_render_chat_matches_platform_selectors() {
        for platform in Platform::ALL {
            let page = VirtualPage::new(platform.config().hostnames[0]);
            let chat = page.render_chat(platform, "line one\nline two").unwrap();
            let config = platform.config();

            assert_eq!(page.query_selector(config.input_selector).unwrap(), Some(chat.input));
            assert_eq!(
                page.query_selector_all(config.submit_selector).unwrap(),
                vec![chat.submit],
                "{platform}"
            );
            assert_eq!(
                config.text_extraction.extract(&page, chat.input).unwrap(),
                "line one\nline two"
            );
        }
    }

    #[tokio::test]
    async fn test_type_text_fires_input() {
        let (page, input, _) = chat_page();
        let counter = Counter::new(false, false);
        page.add_event_listener(input, "input", counter.clone()).unwrap();

        page.type_text(input, "hello").await.unwrap();
        assert_eq!(page.value(input).unwrap().as_deref(), Some("hello"));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }
}
