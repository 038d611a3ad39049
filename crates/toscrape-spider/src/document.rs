//! Structural lookups over parsed pages.
//!
//! Extraction rules are written against [`PageDocument`] and [`PageElement`] so
//! they do not depend on a particular HTML tree. [`scraper::Html`] is the
//! implementation used for crawled pages.

use scraper::{ElementRef, Html};

/// Predicate selecting elements by name and by a substring of their `class` attribute.
///
/// The class test is done on the raw attribute value, so an element carrying
/// several classes still matches, as does any class merely containing `class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    tag: &'static str,
    class: Option<&'static str>,
}

impl Marker {
    /// Any element named `tag`.
    pub const fn tag(tag: &'static str) -> Self {
        Self { tag, class: None }
    }

    /// Elements named `tag` whose class attribute contains `class`.
    pub const fn class(tag: &'static str, class: &'static str) -> Self {
        Self {
            tag,
            class: Some(class),
        }
    }

    pub fn matches(&self, name: &str, class_attr: Option<&str>) -> bool {
        let name_matches = self.tag.eq_ignore_ascii_case(name);
        let class_matches = match self.class {
            Some(class) => class_attr.map_or(false, |attr| attr.contains(class)),
            None => true,
        };
        name_matches && class_matches
    }
}

pub trait PageElement<'a>: Copy + Sized {
    fn name(&self) -> &'a str;

    fn attr(&self, name: &str) -> Option<&'a str>;

    /// The first text node directly under this element.
    fn first_text(&self) -> Option<&'a str>;

    /// Descendants of this element (excluding itself) matching `marker`, in document order.
    fn find_all(&self, marker: &Marker) -> Vec<Self>;

    fn find_first(&self, marker: &Marker) -> Option<Self> {
        self.find_all(marker).into_iter().next()
    }

    fn is(&self, marker: &Marker) -> bool {
        marker.matches(self.name(), self.attr("class"))
    }
}

pub trait PageDocument {
    type Element<'a>: PageElement<'a>
    where
        Self: 'a;

    /// Elements of the whole document matching `marker`, in document order.
    fn find_all<'a>(&'a self, marker: &Marker) -> Vec<Self::Element<'a>>;

    fn find_first<'a>(&'a self, marker: &Marker) -> Option<Self::Element<'a>> {
        self.find_all(marker).into_iter().next()
    }
}

impl<'a> PageElement<'a> for ElementRef<'a> {
    fn name(&self) -> &'a str {
        self.value().name()
    }

    fn attr(&self, name: &str) -> Option<&'a str> {
        self.value().attr(name)
    }

    fn first_text(&self) -> Option<&'a str> {
        self.children()
            .find_map(|child| child.value().as_text())
            .map(|text| &**text)
    }

    fn find_all(&self, marker: &Marker) -> Vec<Self> {
        self.descendants()
            .skip(1) // Skip self
            .filter_map(ElementRef::wrap)
            .filter(|elem| PageElement::is(elem, marker))
            .collect()
    }

    fn find_first(&self, marker: &Marker) -> Option<Self> {
        self.descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .find(|elem| PageElement::is(elem, marker))
    }
}

impl PageDocument for Html {
    type Element<'a> = ElementRef<'a>;

    fn find_all<'a>(&'a self, marker: &Marker) -> Vec<ElementRef<'a>> {
        self.tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|elem| PageElement::is(elem, marker))
            .collect()
    }

    fn find_first<'a>(&'a self, marker: &Marker) -> Option<ElementRef<'a>> {
        self.tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|elem| PageElement::is(elem, marker))
    }
}
