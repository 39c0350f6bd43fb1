//! Segment markup – a controlled HTML subset parsed into a small DOM.
//!
//! Every element gets a [`NodeId`] in document order when parsed. Ids are
//! stable across spacer insertion, which is how protected regions found in
//! one render are mapped back onto the markup before the next render.

use std::collections::HashMap;

/// Stable identity of an element within one [`Markup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// The tag name of a supported element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    Section,
    Article,
    Header,
    Footer,
    Ul,
    Ol,
    Li,
    Table,
    Thead,
    Tbody,
    Tr,
    Td,
    Th,
    Span,
    Strong,
    Em,
    Br,
    Img,
    Body,
    Html,
    Head,
    /// Height-only element inserted by the spacer injector.
    Spacer,
    /// Unknown tags are kept and laid out like divs.
    Unknown(String),
}

impl Tag {
    pub fn from_name(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "section" => Tag::Section,
            "article" => Tag::Article,
            "header" => Tag::Header,
            "footer" => Tag::Footer,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "strong" | "b" => Tag::Strong,
            "em" | "i" => Tag::Em,
            "br" => Tag::Br,
            "img" => Tag::Img,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            other => Tag::Unknown(other.to_string()),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Tag::Span | Tag::Strong | Tag::Em | Tag::Br)
    }

    /// Elements whose text content flows as one wrapped paragraph.
    pub fn is_paragraph(&self) -> bool {
        matches!(self, Tag::P | Tag::H1 | Tag::H2 | Tag::H3 | Tag::Li | Tag::Td | Tag::Th)
    }

    fn is_void(name: &str) -> bool {
        matches!(
            name.to_ascii_lowercase().as_str(),
            "img" | "br" | "hr" | "meta" | "link" | "input"
        )
    }

    fn is_raw_text(name: &str) -> bool {
        matches!(name.to_ascii_lowercase().as_str(), "style" | "script" | "title")
    }
}

/// A node in the segment DOM.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying its id, tag, attributes and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub id: NodeId,
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(id: NodeId, tag: Tag) -> Self {
        Self {
            id,
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attr("style")
    }

    pub fn src(&self) -> Option<&str> {
        self.attr("src")
    }

    /// Height of a spacer element in CSS pixels.
    pub fn spacer_height(&self) -> Option<f32> {
        if self.tag != Tag::Spacer {
            return None;
        }
        self.attr(SPACER_HEIGHT_ATTR).and_then(|h| h.parse().ok())
    }
}

const SPACER_HEIGHT_ATTR: &str = "data-spacer-height";

/// Parsed content of one segment.
#[derive(Debug, Clone, Default)]
pub struct Markup {
    nodes: Vec<DomNode>,
    next_id: u32,
}

impl Markup {
    /// Parse an HTML fragment or document. A `<body>` element, when present,
    /// becomes the content root.
    pub fn parse(html: &str) -> Self {
        let mut parser = Parser::new(html);
        let nodes = parser.parse_nodes();
        let nodes = body_children(nodes);
        Self {
            nodes,
            next_id: parser.next_id,
        }
    }

    pub fn nodes(&self) -> &[DomNode] {
        &self.nodes
    }

    /// True when the segment holds no elements and no visible text.
    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(|n| match n {
            DomNode::Text(t) => t.trim().is_empty(),
            DomNode::Element(_) => false,
        })
    }

    pub fn find(&self, id: NodeId) -> Option<&ElementNode> {
        find_in(&self.nodes, id)
    }

    /// Insert a spacer of `height_css` CSS pixels as the preceding sibling of
    /// element `anchor`. Returns false when `anchor` is not in the tree.
    pub fn insert_spacer_before(&mut self, anchor: NodeId, height_css: f32) -> bool {
        let mut spacer = ElementNode::new(NodeId(self.next_id), Tag::Spacer);
        spacer
            .attributes
            .insert(SPACER_HEIGHT_ATTR.to_string(), height_css.to_string());
        match insert_before(&mut self.nodes, anchor, spacer) {
            Ok(()) => {
                self.next_id += 1;
                true
            }
            Err(_) => false,
        }
    }

    pub fn spacer_count(&self) -> usize {
        count_spacers(&self.nodes)
    }
}

fn find_in(nodes: &[DomNode], id: NodeId) -> Option<&ElementNode> {
    nodes.iter().find_map(|node| match node {
        DomNode::Element(e) if e.id == id => Some(e),
        DomNode::Element(e) => find_in(&e.children, id),
        DomNode::Text(_) => None,
    })
}

/// Hands the spacer back when the anchor is not found in `nodes`.
fn insert_before(
    nodes: &mut Vec<DomNode>,
    anchor: NodeId,
    spacer: ElementNode,
) -> Result<(), ElementNode> {
    if let Some(pos) = nodes
        .iter()
        .position(|n| matches!(n, DomNode::Element(e) if e.id == anchor))
    {
        nodes.insert(pos, DomNode::Element(spacer));
        return Ok(());
    }
    let mut spacer = spacer;
    for node in nodes.iter_mut() {
        if let DomNode::Element(e) = node {
            match insert_before(&mut e.children, anchor, spacer) {
                Ok(()) => return Ok(()),
                Err(back) => spacer = back,
            }
        }
    }
    Err(spacer)
}

fn count_spacers(nodes: &[DomNode]) -> usize {
    nodes
        .iter()
        .map(|n| match n {
            DomNode::Element(e) if e.tag == Tag::Spacer => 1,
            DomNode::Element(e) => count_spacers(&e.children),
            DomNode::Text(_) => 0,
        })
        .sum()
}

/// Children of `<body>` (searched through `<html>`), or the nodes themselves
/// when there is no body.
fn body_children(nodes: Vec<DomNode>) -> Vec<DomNode> {
    fn find_body(nodes: &[DomNode]) -> Option<&ElementNode> {
        nodes.iter().find_map(|n| match n {
            DomNode::Element(e) if e.tag == Tag::Body => Some(e),
            DomNode::Element(e) if e.tag == Tag::Html => find_body(&e.children),
            _ => None,
        })
    }
    match find_body(&nodes) {
        Some(body) => body.children.clone(),
        None => nodes
            .into_iter()
            .filter(|n| !matches!(n, DomNode::Element(e) if e.tag == Tag::Head))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Parser – recursive descent over the controlled subset
// ---------------------------------------------------------------------------

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    next_id: u32,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            next_id: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    /// Move past the next occurrence of `needle`, or to the end of input.
    fn skip_past(&mut self, needle: &str) {
        match self.rest().find(needle) {
            Some(i) => self.pos += i + needle.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        while !self.eof() && !self.starts_with("</") {
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_past("-->");
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            self.skip_past(">");
            return None;
        }
        if self.starts_with("<") {
            return self.parse_element();
        }
        let start = self.pos;
        match self.rest().find('<') {
            Some(i) => self.pos += i,
            None => self.pos = self.input.len(),
        }
        let text = &self.input[start..self.pos];
        if text.trim().is_empty() && !text.is_empty() && self.starts_with("<") {
            // Inter-element indentation.
            return None;
        }
        Some(DomNode::Text(decode_entities(text)))
    }

    fn parse_element(&mut self) -> Option<DomNode> {
        self.bump(); // '<'
        let name = self.parse_name();
        if name.is_empty() {
            // A stray '<' is text.
            return Some(DomNode::Text("<".to_string()));
        }

        let mut attributes = HashMap::new();
        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let (key, value) = self.parse_attribute();
            if key.is_empty() {
                // Unparseable attribute junk; skip a character to make progress.
                self.bump();
                continue;
            }
            attributes.insert(key.to_ascii_lowercase(), value);
        }

        let explicitly_closed = self.starts_with("/>");
        self.skip_past(">");

        if Tag::is_raw_text(&name) {
            self.skip_past(&format!("</{name}"));
            self.skip_past(">");
            return None;
        }

        let mut elem = ElementNode::new(self.alloc_id(), Tag::from_name(&name));
        elem.attributes = attributes;
        if explicitly_closed || Tag::is_void(&name) {
            return Some(DomNode::Element(elem));
        }

        elem.children = self.parse_nodes();

        if self.starts_with("</") {
            self.pos += 2;
            self.parse_name();
            self.skip_past(">");
        }
        Some(DomNode::Element(elem))
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ':')
        {
            self.bump();
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.bump();
        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let start = self.pos;
                match self.rest().find(quote) {
                    Some(i) => self.pos += i,
                    None => self.pos = self.input.len(),
                }
                let raw = &self.input[start..self.pos];
                self.bump();
                decode_entities(raw)
            }
            _ => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| !c.is_whitespace() && c != '>' && c != '/')
                {
                    self.bump();
                }
                self.input[start..self.pos].to_string()
            }
        };
        (key, value)
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{00A0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(markup: &Markup) -> &ElementNode {
        match &markup.nodes()[0] {
            DomNode::Element(e) => e,
            DomNode::Text(t) => panic!("Expected element, got text {t:?}"),
        }
    }

    #[test]
    fn parse_simple_div() {
        let markup = Markup::parse(r#"<div class="card avoid-break"><p>Hello</p></div>"#);
        assert_eq!(markup.nodes().len(), 1);
        let div = first_element(&markup);
        assert_eq!(div.tag, Tag::Div);
        assert_eq!(div.classes(), vec!["card", "avoid-break"]);
        assert!(div.has_class("avoid-break"));
        assert_eq!(div.children.len(), 1);
    }

    #[test]
    fn ids_follow_document_order() {
        let markup = Markup::parse("<div><p>a</p><p>b</p></div><p>c</p>");
        let div = first_element(&markup);
        assert_eq!(div.id, NodeId(0));
        let DomNode::Element(p1) = &div.children[0] else {
            panic!("Expected p");
        };
        assert_eq!(p1.id, NodeId(1));
        assert!(markup.find(NodeId(3)).is_some());
        assert!(markup.find(NodeId(4)).is_none());
    }

    #[test]
    fn parse_table_sections() {
        let html = "<table><thead><tr><th>A</th></tr></thead>\
                    <tbody><tr><td>1</td></tr><tr><td>2</td></tr></tbody></table>";
        let markup = Markup::parse(html);
        let table = first_element(&markup);
        assert_eq!(table.tag, Tag::Table);
        assert_eq!(table.children.len(), 2);
        let DomNode::Element(tbody) = &table.children[1] else {
            panic!("Expected tbody");
        };
        assert_eq!(tbody.tag, Tag::Tbody);
        assert_eq!(tbody.children.len(), 2);
    }

    #[test]
    fn void_and_raw_text_elements() {
        let html = r#"<style>p { color: red }</style><img src="logo.png"><br><p>x</p>"#;
        let markup = Markup::parse(html);
        let tags: Vec<Tag> = markup
            .nodes()
            .iter()
            .filter_map(|n| match n {
                DomNode::Element(e) => Some(e.tag.clone()),
                DomNode::Text(_) => None,
            })
            .collect();
        assert_eq!(tags, vec![Tag::Img, Tag::Br, Tag::P]);
    }

    #[test]
    fn body_becomes_root() {
        let html = "<!DOCTYPE html><html><head><title>t</title></head>\
                    <body><p>one</p><p>two</p></body></html>";
        let markup = Markup::parse(html);
        assert_eq!(markup.nodes().len(), 2);
    }

    #[test]
    fn blank_detection() {
        assert!(Markup::parse("").is_blank());
        assert!(Markup::parse("   \n\t ").is_blank());
        assert!(Markup::parse("<!-- nothing -->").is_blank());
        assert!(!Markup::parse("<div></div>").is_blank());
        assert!(!Markup::parse("plain text").is_blank());
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#8378;1"), "a & b <c> \u{20BA}1");
        assert_eq!(decode_entities("AT&T"), "AT&T");
    }

    #[test]
    fn spacer_goes_before_anchor() {
        let mut markup =
            Markup::parse("<table><tbody><tr><td>1</td></tr><tr><td>2</td></tr></tbody></table>");
        // table=0 tbody=1 tr=2 td=3 tr=4 td=5
        assert!(markup.insert_spacer_before(NodeId(4), 12.5));
        assert_eq!(markup.spacer_count(), 1);
        let spacer = markup.find(NodeId(6)).expect("spacer gets the next id");
        assert_eq!(spacer.spacer_height(), Some(12.5));

        let table = first_element(&markup);
        let DomNode::Element(tbody) = &table.children[0] else {
            panic!("Expected tbody");
        };
        let ids: Vec<NodeId> = tbody
            .children
            .iter()
            .filter_map(|n| match n {
                DomNode::Element(e) => Some(e.id),
                DomNode::Text(_) => None,
            })
            .collect();
        assert_eq!(ids, vec![NodeId(2), NodeId(6), NodeId(4)]);
    }

    #[test]
    fn spacer_with_unknown_anchor_is_rejected() {
        let mut markup = Markup::parse("<p>x</p>");
        assert!(!markup.insert_spacer_before(NodeId(99), 10.0));
        assert_eq!(markup.spacer_count(), 0);
    }
}
