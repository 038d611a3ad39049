//! The extraction rule runs on any tree implementing `PageDocument`.

use toscrape_spider::document::{Marker, PageDocument, PageElement};
use toscrape_spider::{extract, Record};
use url::Url;

struct Node {
    name: &'static str,
    class: Option<&'static str>,
    href: Option<&'static str>,
    text: Option<&'static str>,
    children: Vec<Node>,
}

fn elem(name: &'static str, class: Option<&'static str>, children: Vec<Node>) -> Node {
    Node {
        name,
        class,
        href: None,
        text: None,
        children,
    }
}

fn text_elem(name: &'static str, class: &'static str, text: &'static str) -> Node {
    Node {
        text: Some(text),
        ..elem(name, Some(class), vec![])
    }
}

fn link(href: &'static str) -> Node {
    Node {
        href: Some(href),
        ..elem("a", None, vec![])
    }
}

#[derive(Clone, Copy)]
struct NodeRef<'a>(&'a Node);

impl<'a> NodeRef<'a> {
    fn collect(self, marker: &Marker, found: &mut Vec<NodeRef<'a>>) {
        for child in &self.0.children {
            let child = NodeRef(child);
            if child.is(marker) {
                found.push(child);
            }
            child.collect(marker, found);
        }
    }
}

impl<'a> PageElement<'a> for NodeRef<'a> {
    fn name(&self) -> &'a str {
        self.0.name
    }

    fn attr(&self, name: &str) -> Option<&'a str> {
        match name {
            "class" => self.0.class,
            "href" => self.0.href,
            _ => None,
        }
    }

    fn first_text(&self) -> Option<&'a str> {
        self.0.text
    }

    fn find_all(&self, marker: &Marker) -> Vec<Self> {
        let mut found = vec![];
        self.collect(marker, &mut found);
        found
    }
}

impl PageDocument for Node {
    type Element<'a> = NodeRef<'a>;

    fn find_all<'a>(&'a self, marker: &Marker) -> Vec<NodeRef<'a>> {
        let root = NodeRef(self);
        let mut found = vec![];
        if root.is(marker) {
            found.push(root);
        }
        root.collect(marker, &mut found);
        found
    }
}

#[test]
fn extract_from_custom_tree() {
    let page = elem(
        "body",
        None,
        vec![
            elem(
                "div",
                Some("quote"),
                vec![
                    text_elem("span", "text", "The world as we have created it..."),
                    elem(
                        "span",
                        None,
                        vec![text_elem("small", "author", "Albert Einstein")],
                    ),
                ],
            ),
            elem("ul", Some("pager"), vec![elem("li", Some("next"), vec![link("/page/2/")])]),
        ],
    );
    let base = Url::parse("http://quotes.toscrape.com/page/1/").unwrap();

    let out = extract(&page, &base);

    assert_eq!(
        out.records,
        vec![Record {
            text: Some("The world as we have created it...".into()),
            author: Some("Albert Einstein".into()),
        }]
    );
    assert_eq!(
        out.follow.unwrap().url.as_str(),
        "http://quotes.toscrape.com/page/2/"
    );
}
