use std::collections::{BTreeMap, BTreeSet};

/// Marker class on the wrapper container of a conditional field.
pub const MARKER_CLASS: &str = "cond-field";
/// Hidden variant of the marker class.
pub const HIDDEN_CLASS: &str = "cond-field--hidden";
/// Attribute holding a serialized `ValidationRule` for the field.
pub const VALIDATE_ATTR: &str = "data-validate";
/// Attribute holding the human-readable label used in announcements.
pub const LABEL_ATTR: &str = "data-label";

/// Stable handle to one element inside a [`FormTree`].
pub type ElementId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Text,
    Checkbox,
    Radio,
    Hidden,
    Select,
    TextArea,
    /// Wrapper container around a conditional field.
    Container,
    /// Injected loading/error surface.
    Surface,
    /// Off-screen live region for assistive announcements.
    LiveRegion,
    Button,
}

impl ElementKind {
    /// Whether the element contributes a value during collection.
    pub fn is_input(self) -> bool {
        matches!(
            self,
            Self::Text | Self::Checkbox | Self::Radio | Self::Hidden | Self::Select | Self::TextArea
        )
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    /// Raw element name, typically `formId[fieldId]`.
    pub name: String,
    pub value: String,
    pub checked: bool,
    pub parent: Option<ElementId>,
    classes: BTreeSet<String>,
    attrs: BTreeMap<String, String>,
}

impl Element {
    fn new(kind: ElementKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            value: String::new(),
            checked: false,
            parent: None,
            classes: BTreeSet::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// Retained in-memory form: elements in document order, with class
/// sets, attribute maps, and a single focused element.
///
/// Mutation of classes and attributes is expected to come from the UI
/// and accessibility managers only; hosts build the tree once and then
/// feed change events to the engine.
#[derive(Debug)]
pub struct FormTree {
    form_id: String,
    /// Slot per element; removed slots stay `None` so ids stay stable.
    elements: Vec<Option<Element>>,
    focused: Option<ElementId>,
}

impl FormTree {
    pub fn new(form_id: impl Into<String>) -> Self {
        Self {
            form_id: form_id.into(),
            elements: Vec::new(),
            focused: None,
        }
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    // ----- construction ------------------------------------------------

    pub fn insert(&mut self, element: Element) -> ElementId {
        let id = self.elements.len();
        self.elements.push(Some(element));
        id
    }

    /// Remove an element (and nothing else; callers detach any
    /// children themselves). Focus on the removed element is dropped.
    pub fn remove(&mut self, id: ElementId) {
        if let Some(slot) = self.elements.get_mut(id) {
            *slot = None;
        }
        if self.focused == Some(id) {
            self.focused = None;
        }
    }

    /// Add a conditional field: a `MARKER_CLASS` wrapper containing a
    /// single input named `formId[fieldId]`. Returns the input's id.
    pub fn add_field(&mut self, field_id: &str, kind: ElementKind) -> ElementId {
        let mut wrapper = Element::new(ElementKind::Container, format!("{field_id}-wrap"));
        wrapper.classes.insert(MARKER_CLASS.to_string());
        let wrapper_id = self.insert(wrapper);

        let mut input = Element::new(kind, compose_field_name(&self.form_id, field_id));
        input.parent = Some(wrapper_id);
        self.insert(input)
    }

    pub fn add_text_field(&mut self, field_id: &str) -> ElementId {
        self.add_field(field_id, ElementKind::Text)
    }

    pub fn add_checkbox(&mut self, field_id: &str, checked: bool) -> ElementId {
        let id = self.add_field(field_id, ElementKind::Checkbox);
        self.element_mut(id).checked = checked;
        id
    }

    pub fn add_radio(&mut self, field_id: &str, value: &str, checked: bool) -> ElementId {
        let id = self.add_field(field_id, ElementKind::Radio);
        let el = self.element_mut(id);
        el.value = value.to_string();
        el.checked = checked;
        id
    }

    /// Add a bare element with a raw name, outside any wrapper (hidden
    /// checkbox companions, surfaces, live regions).
    pub fn add_bare(&mut self, kind: ElementKind, name: &str, value: &str) -> ElementId {
        let mut el = Element::new(kind, name);
        el.value = value.to_string();
        self.insert(el)
    }

    // ----- element access ----------------------------------------------

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id).and_then(Option::as_ref)
    }

    /// Panics on a dangling id; ids are only ever produced by this
    /// tree, so a dangling id is a caller bug.
    pub fn element_mut(&mut self, id: ElementId) -> &mut Element {
        self.elements
            .get_mut(id)
            .and_then(Option::as_mut)
            .expect("dangling element id")
    }

    /// All live element ids in document order.
    pub fn ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
    }

    /// Input-capable elements in document order.
    pub fn inputs(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.ids()
            .filter(|id| self.element(*id).is_some_and(|el| el.kind.is_input()))
    }

    pub fn find_input_by_name(&self, name: &str) -> Option<ElementId> {
        self.inputs()
            .find(|id| self.element(*id).is_some_and(|el| el.name == name))
    }

    /// The input element for a canonical field id.
    pub fn find_field(&self, field_id: &str) -> Option<ElementId> {
        self.find_input_by_name(&compose_field_name(&self.form_id, field_id))
    }

    /// The marker-classed wrapper containing an element, if any.
    pub fn wrapper_of(&self, id: ElementId) -> Option<ElementId> {
        let parent = self.element(id)?.parent?;
        self.element(parent)
            .filter(|el| el.has_class(MARKER_CLASS))
            .map(|_| parent)
    }

    // ----- classes and attributes --------------------------------------

    pub fn add_class(&mut self, id: ElementId, class: &str) {
        self.element_mut(id).classes.insert(class.to_string());
    }

    pub fn remove_class(&mut self, id: ElementId, class: &str) {
        self.element_mut(id).classes.remove(class);
    }

    pub fn set_attr(&mut self, id: ElementId, key: &str, value: &str) {
        self.element_mut(id)
            .attrs
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove_attr(&mut self, id: ElementId, key: &str) {
        self.element_mut(id).attrs.remove(key);
    }

    /// Human-readable label for announcements: the explicit label
    /// attribute when present, else the field id with separators
    /// spaced out and the first letter capitalized.
    pub fn label_of(&self, id: ElementId) -> String {
        let Some(el) = self.element(id) else {
            return String::new();
        };
        if let Some(label) = el.attr(LABEL_ATTR) {
            return label.to_string();
        }
        let field = parse_field_name(&el.name, &self.form_id)
            .unwrap_or_else(|| el.name.clone());
        humanize(&field)
    }

    // ----- focus --------------------------------------------------------

    pub fn focused(&self) -> Option<ElementId> {
        self.focused
    }

    pub fn set_focus(&mut self, id: Option<ElementId>) {
        self.focused = id.filter(|id| self.element(*id).is_some());
    }

    /// Whether an element can receive focus: an input that is not
    /// inert and whose wrapper (if any) is not hidden.
    pub fn is_focusable(&self, id: ElementId) -> bool {
        let Some(el) = self.element(id) else {
            return false;
        };
        if !el.kind.is_input() || el.kind == ElementKind::Hidden {
            return false;
        }
        if el.attr("inert").is_some() {
            return false;
        }
        match self.wrapper_of(id) {
            Some(wrapper) => !self
                .element(wrapper)
                .is_some_and(|w| w.has_class(HIDDEN_CLASS)),
            None => true,
        }
    }

    /// Next focusable element strictly after `id` in document order.
    pub fn next_focusable_after(&self, id: ElementId) -> Option<ElementId> {
        self.ids()
            .filter(|candidate| *candidate > id)
            .find(|candidate| self.is_focusable(*candidate))
    }

    pub fn first_focusable(&self) -> Option<ElementId> {
        self.ids().find(|candidate| self.is_focusable(*candidate))
    }
}

/// Compose the canonical element name for a field: `formId[fieldId]`.
pub fn compose_field_name(form_id: &str, field_id: &str) -> String {
    format!("{form_id}[{field_id}]")
}

/// Extract the field id from a `formId[fieldId]` element name. Names
/// that do not match the pattern yield `None`; callers fall back to
/// the raw name.
pub fn parse_field_name(raw: &str, form_id: &str) -> Option<String> {
    let rest = raw.strip_prefix(form_id)?;
    let inner = rest.strip_prefix('[')?.strip_suffix(']')?;
    (!inner.is_empty() && !inner.contains('[')).then(|| inner.to_string())
}

fn humanize(field_id: &str) -> String {
    let spaced: String = field_id
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}
