use super::LocateError;
use super::span::{Fragment, Span, TextSpan};
use crate::wml::{self, PARAGRAPH_MARK};
use crate::xml::{Element, NodePath, XmlNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRun {
    /// Path from the `w:document` root.
    pub path: NodePath,
    pub span: Span,
    /// Ordinal of the paragraph holding the run.
    pub paragraph: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedParagraph {
    pub path: NodePath,
    /// The paragraph's text, excluding its paragraph mark.
    pub span: Span,
    pub style: Option<String>,
}

/// Flattened visible text of a body with an offset map back to its runs.
///
/// Paragraphs are collected through tables, content controls and other
/// block containers; runs through hyperlinks, insertions and other inline
/// containers. Runs inside `w:del` and `w:moveFrom` are not visible.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    text: String,
    runs: Vec<IndexedRun>,
    paragraphs: Vec<IndexedParagraph>,
}

impl TextIndex {
    /// Indexes the `w:body` of a `w:document` element.
    pub fn build(document: &Element) -> Self {
        let mut index = Self::default();
        let body = document
            .children
            .iter()
            .position(|child| child.as_element().is_some_and(|el| el.is(wml::BODY)));
        if let Some(position) = body
            && let Some(XmlNode::Element(body)) = document.children.get(position)
        {
            index.walk_blocks(body, &NodePath::from(vec![position]));
        }
        index
    }

    fn walk_blocks(&mut self, el: &Element, path: &NodePath) {
        for (i, child) in el.children.iter().enumerate() {
            let XmlNode::Element(child) = child else {
                continue;
            };
            if child.is(wml::P) {
                self.add_paragraph(child, path.child(i));
            } else if !(wml::hides_content(child) || child.is(wml::SECT_PR)) {
                self.walk_blocks(child, &path.child(i));
            }
        }
    }

    fn add_paragraph(&mut self, paragraph: &Element, path: NodePath) {
        let ordinal = self.paragraphs.len();
        let start = self.text.len();
        self.collect_runs(paragraph, &path, ordinal);
        self.paragraphs.push(IndexedParagraph {
            path,
            span: Span::new(start, self.text.len()),
            style: wml::paragraph_style(paragraph),
        });
        self.text.push(PARAGRAPH_MARK);
    }

    fn collect_runs(&mut self, el: &Element, path: &NodePath, paragraph: usize) {
        for (i, child) in el.children.iter().enumerate() {
            let XmlNode::Element(child) = child else {
                continue;
            };
            if child.is(wml::R) {
                let start = self.text.len();
                self.text.push_str(&wml::run_text(child));
                self.runs.push(IndexedRun {
                    path: path.child(i),
                    span: Span::new(start, self.text.len()),
                    paragraph,
                });
            } else if !(child.is(wml::PPR) || child.is(wml::P) || wml::hides_content(child)) {
                self.collect_runs(child, &path.child(i), paragraph);
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn runs(&self) -> &[IndexedRun] {
        &self.runs
    }

    pub fn paragraphs(&self) -> &[IndexedParagraph] {
        &self.paragraphs
    }

    /// Runs of one paragraph, in document order.
    pub fn paragraph_runs(&self, paragraph: usize) -> &[IndexedRun] {
        let start = self.runs.partition_point(|run| run.paragraph < paragraph);
        let end = self.runs.partition_point(|run| run.paragraph <= paragraph);
        &self.runs[start..end]
    }

    /// The paragraph whose text, or whose end, contains `offset`.
    pub fn paragraph_at(&self, offset: usize) -> Option<usize> {
        let candidate = self
            .paragraphs
            .partition_point(|paragraph| paragraph.span.end < offset);
        let paragraph = self.paragraphs.get(candidate)?;
        (paragraph.span.start <= offset).then_some(candidate)
    }

    /// Start offsets of every occurrence of `query`, overlapping ones
    /// included.
    pub fn occurrences(&self, query: &str) -> Vec<usize> {
        let mut found = Vec::new();
        if query.is_empty() {
            return found;
        }
        let mut from = 0;
        while let Some(pos) = self.text[from..].find(query) {
            let at = from + pos;
            found.push(at);
            from = at + self.text[at..].chars().next().map_or(1, char::len_utf8);
        }
        found
    }

    /// Decomposes `span` into run fragments.
    pub fn resolve(&self, span: Span, generation: u64) -> Result<TextSpan, LocateError> {
        let covered = self
            .text
            .get(span.start..span.end)
            .ok_or(LocateError::OutOfRange { offset: span.end })?;
        if covered.contains(PARAGRAPH_MARK) {
            return Err(LocateError::CrossesParagraph {
                text: covered.to_string(),
            });
        }
        let paragraph = self
            .paragraph_at(span.start)
            .ok_or(LocateError::OutOfRange { offset: span.start })?;
        let runs = self.paragraph_runs(paragraph);

        let fragments = if span.is_empty() {
            self.touching_run(runs, span.start).into_iter().collect()
        } else {
            runs.iter()
                .filter(|run| run.span.overlaps(span))
                .map(|run| Fragment {
                    run: run.path.clone(),
                    run_len: run.span.len(),
                    start: span.start.max(run.span.start) - run.span.start,
                    end: span.end.min(run.span.end) - run.span.start,
                })
                .collect()
        };

        Ok(TextSpan {
            span,
            paragraph,
            paragraph_path: self.paragraphs[paragraph].path.clone(),
            fragments,
            generation,
        })
    }

    fn touching_run(&self, runs: &[IndexedRun], at: usize) -> Option<Fragment> {
        let run = runs
            .iter()
            .rev()
            .find(|run| run.span.start < at && at <= run.span.end)
            .or_else(|| {
                runs.iter()
                    .find(|run| run.span.start >= at && !run.span.is_empty())
            })?;
        let offset = at.saturating_sub(run.span.start);
        Some(Fragment {
            run: run.path.clone(),
            run_len: run.span.len(),
            start: offset,
            end: offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Body;
    use crate::test_support::{paragraph_xml, runs_xml};
    use pretty_assertions::assert_eq;

    fn index(paragraphs: &[String]) -> TextIndex {
        TextIndex::build(Body::from_paragraphs(paragraphs).root())
    }

    #[test]
    fn test_flattened_text_marks_paragraph_ends() {
        let index = index(&[paragraph_xml("One"), paragraph_xml("Two")]);
        assert_eq!(index.text(), "One\nTwo\n");
        assert_eq!(index.paragraphs()[1].span, Span::new(4, 7));
    }

    #[test]
    fn test_deleted_runs_are_invisible_and_inserted_runs_visible() {
        let p = r#"<w:p><w:r><w:t>keep </w:t></w:r><w:del w:id="1" w:author="a"><w:r><w:delText>gone </w:delText></w:r></w:del><w:ins w:id="2" w:author="a"><w:r><w:t>new</w:t></w:r></w:ins></w:p>"#;
        let index = index(&[p.to_string()]);
        assert_eq!(index.text(), "keep new\n");
        assert_eq!(index.runs().len(), 2);
        assert_eq!(index.runs()[1].path.indices(), &[0, 0, 2, 0]);
    }

    #[test]
    fn test_table_cells_and_hyperlinks_are_indexed() {
        let table = format!(
            "<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>",
            paragraph_xml("cell")
        );
        let link = r#"<w:p><w:hyperlink r:id="rId9"><w:r><w:t>link</w:t></w:r></w:hyperlink></w:p>"#;
        let index = index(&[table, link.to_string()]);
        assert_eq!(index.text(), "cell\nlink\n");
        assert_eq!(index.paragraphs().len(), 2);
    }

    #[test]
    fn test_resolve_splits_into_fragments() {
        let index = index(&[runs_xml(&["Hello ", "big ", "world"])]);
        let span = index.resolve(Span::new(3, 13), 0).unwrap();
        let fragments: Vec<(usize, usize, usize)> = span
            .fragments
            .iter()
            .map(|f| (f.run_len, f.start, f.end))
            .collect();
        assert_eq!(fragments, vec![(6, 3, 6), (4, 0, 4), (5, 0, 3)]);
    }

    #[test]
    fn test_resolve_rejects_paragraph_crossing() {
        let index = index(&[paragraph_xml("One"), paragraph_xml("Two")]);
        let err = index.resolve(Span::new(2, 5), 0).unwrap_err();
        assert!(matches!(err, LocateError::CrossesParagraph { .. }));
    }

    #[test]
    fn test_point_touches_preceding_run() {
        let index = index(&[runs_xml(&["ab", "cd"])]);
        let point = index.resolve(Span::point(2), 0).unwrap();
        assert_eq!(point.fragments.len(), 1);
        assert_eq!(point.fragments[0].run, index.runs()[0].path);
        assert_eq!(point.fragments[0].start, 2);
    }

    #[test]
    fn test_point_at_paragraph_start_touches_following_run() {
        let index = index(&[paragraph_xml("One"), runs_xml(&["ab", "cd"])]);
        let point = index.resolve(Span::point(4), 0).unwrap();
        assert_eq!(point.paragraph, 1);
        assert_eq!(point.fragments[0].run, index.runs()[1].path);
        assert_eq!(point.fragments[0].start, 0);
    }

    #[test]
    fn test_occurrences_count_overlaps() {
        let index = index(&[paragraph_xml("aaaa")]);
        assert_eq!(index.occurrences("aa"), vec![0, 1, 2]);
        assert!(index.occurrences("").is_empty());
    }
}
