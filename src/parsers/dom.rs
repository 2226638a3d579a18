//! Mutable DOM helpers for rewriting whole documents.

use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::serialize::{SerializeOpts, serialize};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::create_element;
use html5ever::{LocalName, namespace_url, ns};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::rc::Rc;

pub fn parse_dom(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// Every element named `name` under `node`, in document order.
///
/// Script and style text, comments and template contents are not elements,
/// so nothing inside them is returned.
pub fn find_elements(node: &Handle, name: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_elements(node, name, &mut found);
    found
}

fn collect_elements(node: &Handle, name: &str, found: &mut Vec<Handle>) {
    if let NodeData::Element { name: ref qual, .. } = node.data {
        if (&*qual.local).eq_ignore_ascii_case(name) {
            found.push(node.clone());
        }
    }
    for child in node.children.borrow().iter() {
        collect_elements(child, name, found);
    }
}

pub fn get_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// Replaces the value of an existing attribute, or adds it.
pub fn set_attr(node: &Handle, attr_name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        match attrs.iter_mut().find(|attr| &*attr.name.local == attr_name) {
            Some(attr) => attr.value = StrTendril::from(value),
            None => attrs.push(attribute(attr_name, value)),
        }
    }
}

/// A detached element with `attrs` and, if `text` is non-empty, one text child.
pub fn new_element(dom: &RcDom, name: &str, attrs: &[(&str, &str)], text: &str) -> Handle {
    let element = create_element(
        dom,
        QualName::new(None, ns!(html), LocalName::from(name)),
        attrs.iter().map(|(n, v)| attribute(n, v)).collect(),
    );
    if !text.is_empty() {
        let text_node = Node::new(NodeData::Text {
            contents: RefCell::new(StrTendril::from(text)),
        });
        append_child(&element, text_node);
    }
    element
}

pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

pub fn prepend_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().insert(0, child);
}

pub fn serialize_dom(dom: &RcDom) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let document: SerializableHandle = dom.document.clone().into();
    serialize(&mut buf, &document, SerializeOpts::default())?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, ns!(), LocalName::from(name)),
        value: StrTendril::from(value),
    }
}
