//! Link resolution for the annotation layer

use serde::{Deserialize, Serialize};

use super::engine::{LinkAnnotation, LinkDestination};
use super::types::{AnnotationRegion, LinkAction, Viewport};

/// Window context external links are opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExternalLinkTarget {
    /// Let the host decide
    None,
    /// Same window
    #[serde(rename = "self")]
    SelfFrame,
    /// New tab/window
    #[default]
    Blank,
    Parent,
    Top,
}

impl ExternalLinkTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalLinkTarget::None => "",
            ExternalLinkTarget::SelfFrame => "_self",
            ExternalLinkTarget::Blank => "_blank",
            ExternalLinkTarget::Parent => "_parent",
            ExternalLinkTarget::Top => "_top",
        }
    }
}

/// Turns link annotations into clickable overlay regions
#[derive(Debug, Clone)]
pub struct LinkService {
    external_target: ExternalLinkTarget,
    page_count: usize,
}

impl LinkService {
    #[must_use]
    pub fn new(external_target: ExternalLinkTarget, page_count: usize) -> Self {
        Self {
            external_target,
            page_count,
        }
    }

    /// Resolve one link. Internal links to pages outside the document and
    /// empty link areas produce no region.
    #[must_use]
    pub fn resolve(&self, link: &LinkAnnotation, viewport: &Viewport) -> Option<AnnotationRegion> {
        if link.bounds.is_empty() {
            return None;
        }

        let action = match &link.dest {
            LinkDestination::Internal { page } => {
                if *page == 0 || *page > self.page_count {
                    log::debug!(
                        "Dropping link to page {page}, document has {} pages",
                        self.page_count
                    );
                    return None;
                }
                LinkAction::GoToPage { page: *page }
            }
            LinkDestination::External { uri } if uri.is_empty() => return None,
            LinkDestination::External { uri } => LinkAction::OpenUri {
                uri: uri.clone(),
                target: self.external_target.as_str().to_string(),
            },
        };

        Some(AnnotationRegion {
            rect: viewport.to_pixels(link.bounds),
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::types::{PageRect, PageSize};

    fn link(dest: LinkDestination) -> LinkAnnotation {
        LinkAnnotation {
            bounds: PageRect::new(10.0, 10.0, 20.0, 15.0),
            dest,
        }
    }

    #[test]
    fn external_links_default_to_new_window() {
        let service = LinkService::new(ExternalLinkTarget::default(), 3);
        let vp = Viewport::for_page(PageSize::new(100.0, 100.0), 2.0);
        let region = service
            .resolve(
                &link(LinkDestination::External {
                    uri: "https://example.com".into(),
                }),
                &vp,
            )
            .expect("region");
        assert_eq!(
            region.action,
            LinkAction::OpenUri {
                uri: "https://example.com".into(),
                target: "_blank".into()
            }
        );
        assert_eq!(region.rect.x, 20.0);
        assert_eq!(region.rect.width, 20.0);
    }

    #[test]
    fn internal_links_outside_document_are_dropped() {
        let service = LinkService::new(ExternalLinkTarget::Blank, 3);
        let vp = Viewport::for_page(PageSize::new(100.0, 100.0), 1.0);
        assert!(service.resolve(&link(LinkDestination::Internal { page: 4 }), &vp).is_none());
        assert_eq!(
            service
                .resolve(&link(LinkDestination::Internal { page: 2 }), &vp)
                .map(|r| r.action),
            Some(LinkAction::GoToPage { page: 2 })
        );
    }

    #[test]
    fn target_parses_from_yaml() {
        let target: ExternalLinkTarget = serde_yaml::from_str("self").expect("parse");
        assert_eq!(target, ExternalLinkTarget::SelfFrame);
        let target: ExternalLinkTarget = serde_yaml::from_str("blank").expect("parse");
        assert_eq!(target.as_str(), "_blank");
    }
}
