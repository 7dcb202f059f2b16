//! PDF back end.
//!
//! Source pages become Form XObjects in the output document and each output
//! page places them with an affine transform. Untransformed single-page
//! slots take a fast path that deep-copies the source page object instead,
//! preserving object-level fidelity.

use std::collections::HashMap;
use std::io::Write;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Result, TransformError};
use crate::reader::{media_box, PdfReader};
use crate::transform::{page_index_to_page_number, DocumentTransform};
use crate::types::{GlobalTransform, Offset, PageList, PageSpec, Rectangle, Slot};

/// A PDF transformation matrix `[a b c d e f]` in row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Counterclockwise rotation. Right angles are exact.
    fn rotate(degrees: i32) -> Self {
        let (sin, cos) = match degrees.rem_euclid(360) {
            0 => (0.0, 1.0),
            90 => (1.0, 0.0),
            180 => (0.0, -1.0),
            270 => (-1.0, 0.0),
            d => (f64::from(d).to_radians().sin(), f64::from(d).to_radians().cos()),
        };
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    fn scale(s: f64) -> Self {
        Self::new(s, 0.0, 0.0, s, 0.0, 0.0)
    }

    fn translate(x: f64, y: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, x, y)
    }

    /// `self` applied first, then `next`.
    fn then(self, next: Matrix) -> Matrix {
        Matrix {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

/// The placement matrix for one page spec: flip, then rotate, then scale,
/// then translate. Flips need the input size to mirror about the page edge.
pub(crate) fn placement_matrix(spec: &PageSpec, in_size: Option<Rectangle>) -> Result<Matrix> {
    let mut m = Matrix::IDENTITY;
    if spec.hflip {
        let size = in_size.ok_or(TransformError::InputSizeUnknown)?;
        m = m.then(Matrix::new(-1.0, 0.0, 0.0, 1.0, size.width, 0.0));
    } else if spec.vflip {
        let size = in_size.ok_or(TransformError::InputSizeUnknown)?;
        m = m.then(Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, size.height));
    }
    if spec.rotate != 0 {
        m = m.then(Matrix::rotate(spec.rotate));
    }
    if spec.scale != 1.0 {
        m = m.then(Matrix::scale(spec.scale));
    }
    if spec.off != Offset::ZERO {
        m = m.then(Matrix::translate(spec.off.x, spec.off.y));
    }
    Ok(m)
}

pub struct PdfTransform<W> {
    reader: PdfReader,
    outfile: W,
    output: Document,
    pages_tree_id: ObjectId,
    page_refs: Vec<Object>,
    copy_cache: HashMap<ObjectId, ObjectId>,
    xobject_cache: HashMap<usize, ObjectId>,
    size: Rectangle,
    in_size: Option<Rectangle>,
    specs: Vec<Slot>,
    draw: f64,
}

impl<W: Write> PdfTransform<W> {
    pub fn new(
        reader: PdfReader,
        outfile: W,
        size: Option<Rectangle>,
        in_size: Option<Rectangle>,
        specs: Vec<Slot>,
        global: GlobalTransform,
        draw: f64,
    ) -> Result<Self> {
        let specs = global.fold(specs);
        let in_size = in_size.or(reader.size);
        let size = size.or(in_size).ok_or(TransformError::PageSizeNotSet)?;
        let mut output = Document::with_version("1.7");
        let pages_tree_id = output.new_object_id();
        Ok(Self {
            reader,
            outfile,
            output,
            pages_tree_id,
            page_refs: Vec::new(),
            copy_cache: HashMap::new(),
            xobject_cache: HashMap::new(),
            size,
            in_size,
            specs,
            draw,
        })
    }

    pub fn into_output(self) -> W {
        self.outfile
    }

    fn resolve(
        &self,
        spec: &PageSpec,
        page_list: &PageList,
        maxpage: usize,
        modulo: usize,
        pagebase: usize,
    ) -> Option<usize> {
        let page_number = page_index_to_page_number(spec, maxpage, modulo, pagebase);
        if page_number >= page_list.len() {
            return None;
        }
        page_list
            .real_page(page_number)
            .filter(|&p| p < self.reader.pages())
    }

    /// Append a verbatim deep copy of a source page.
    fn copy_page(&mut self, real: usize) -> Result<()> {
        let src_id = self.reader.page_ids[real];
        let mut page_dict = self.reader.document.get_dictionary(src_id)?.clone();
        // Parent would drag the whole source page tree along.
        page_dict.remove(b"Parent");
        let copied = copy_object_deep(
            &mut self.output,
            &self.reader.document,
            &Object::Dictionary(page_dict),
            &mut self.copy_cache,
        )?;
        let new_id = self.output.add_object(copied);
        self.output
            .get_object_mut(new_id)?
            .as_dict_mut()?
            .set("Parent", Object::Reference(self.pages_tree_id));
        self.page_refs.push(Object::Reference(new_id));
        Ok(())
    }

    /// Form XObject for a source page, created once per page.
    fn page_xobject(&mut self, real: usize) -> Result<ObjectId> {
        if let Some(&id) = self.xobject_cache.get(&real) {
            return Ok(id);
        }
        let src_id = self.reader.page_ids[real];
        let page_dict = self.reader.document.get_dictionary(src_id)?.clone();

        // A malformed MediaBox degrades to the target-size BBox.
        let bbox = page_dict
            .get(b"MediaBox")
            .and_then(|obj| obj.as_array())
            .ok()
            .filter(|arr| arr.len() == 4)
            .cloned()
            .unwrap_or_else(|| rect_array(self.size));
        let content = page_content(&self.reader.document, &page_dict)?;

        let mut xobject_dict = Dictionary::new();
        xobject_dict.set("Type", Object::Name(b"XObject".to_vec()));
        xobject_dict.set("Subtype", Object::Name(b"Form".to_vec()));
        xobject_dict.set("FormType", Object::Integer(1));
        xobject_dict.set("BBox", Object::Array(bbox.clone()));
        // Shift non-zero media box origins back to (0, 0).
        if let (Some(llx), Some(lly)) = (object_f64(&bbox[0]), object_f64(&bbox[1])) {
            if llx != 0.0 || lly != 0.0 {
                xobject_dict.set(
                    "Matrix",
                    Object::Array(vec![
                        1.into(),
                        0.into(),
                        0.into(),
                        1.into(),
                        Object::Real(-llx as f32),
                        Object::Real(-lly as f32),
                    ]),
                );
            }
        }
        if let Ok(resources) = page_dict.get(b"Resources") {
            let copied = copy_object_deep(
                &mut self.output,
                &self.reader.document,
                resources,
                &mut self.copy_cache,
            )?;
            xobject_dict.set("Resources", copied);
        }

        let id = self.output.add_object(Stream::new(xobject_dict, content));
        self.xobject_cache.insert(real, id);
        Ok(id)
    }

    /// Polyline annotation tracing the placed page's boundary.
    fn border_annotation(&self, m: Matrix) -> Option<Object> {
        let in_size = self.in_size?;
        let corners = [
            (0.0, 0.0),
            (0.0, in_size.height),
            (in_size.width, in_size.height),
            (in_size.width, 0.0),
            (0.0, 0.0),
        ];
        let points: Vec<(f64, f64)> = corners.iter().map(|&(x, y)| m.apply(x, y)).collect();
        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
        let rect = vec![
            Object::Real(xs.iter().cloned().fold(f64::INFINITY, f64::min) as f32),
            Object::Real(ys.iter().cloned().fold(f64::INFINITY, f64::min) as f32),
            Object::Real(xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max) as f32),
            Object::Real(ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max) as f32),
        ];
        let vertices = points
            .iter()
            .flat_map(|&(x, y)| [Object::Real(x as f32), Object::Real(y as f32)])
            .collect();
        Some(Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Annot".to_vec())),
            ("Subtype", Object::Name(b"PolyLine".to_vec())),
            ("Rect", Object::Array(rect)),
            ("Vertices", Object::Array(vertices)),
            (
                "Border",
                Object::Array(vec![
                    0.into(),
                    0.into(),
                    Object::Real(self.draw as f32),
                ]),
            ),
            (
                "C",
                Object::Array(vec![
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(0.0),
                ]),
            ),
        ])))
    }
}

fn rect_array(size: Rectangle) -> Vec<Object> {
    vec![
        0.into(),
        0.into(),
        Object::Real(size.width as f32),
        Object::Real(size.height as f32),
    ]
}

fn object_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Concatenated, decompressed content streams of a page.
fn page_content(doc: &Document, page_dict: &Dictionary) -> Result<Vec<u8>> {
    let contents = match page_dict.get(b"Contents") {
        Ok(c) => c,
        Err(_) => return Ok(Vec::new()),
    };
    let mut result = Vec::new();
    let refs: Vec<ObjectId> = match contents {
        Object::Reference(id) => vec![*id],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|obj| match obj {
                Object::Reference(id) => Some(*id),
                _ => None,
            })
            .collect(),
        _ => return Ok(Vec::new()),
    };
    for id in refs {
        if let Ok(stream) = doc.get_object(id)?.as_stream() {
            let content = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            result.extend_from_slice(&content);
            result.push(b'\n');
        }
    }
    Ok(result)
}

/// Deep copy an object into `output`, following references once each.
fn copy_object_deep(
    output: &mut Document,
    source: &Document,
    obj: &Object,
    cache: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object> {
    match obj {
        Object::Reference(id) => {
            if let Some(&new_id) = cache.get(id) {
                return Ok(Object::Reference(new_id));
            }
            let referenced = source.get_object(*id)?.clone();
            let copied = copy_object_deep(output, source, &referenced, cache)?;
            let new_id = output.add_object(copied);
            cache.insert(*id, new_id);
            Ok(Object::Reference(new_id))
        }
        Object::Dictionary(dict) => {
            let mut new_dict = Dictionary::new();
            for (key, value) in dict.iter() {
                new_dict.set(key.clone(), copy_object_deep(output, source, value, cache)?);
            }
            Ok(Object::Dictionary(new_dict))
        }
        Object::Array(arr) => {
            let new_arr: Result<Vec<_>> = arr
                .iter()
                .map(|item| copy_object_deep(output, source, item, cache))
                .collect();
            Ok(Object::Array(new_arr?))
        }
        Object::Stream(stream) => {
            let mut new_dict = Dictionary::new();
            for (key, value) in stream.dict.iter() {
                new_dict.set(key.clone(), copy_object_deep(output, source, value, cache)?);
            }
            let mut new_stream = Stream::new(new_dict, stream.content.clone());
            new_stream.allows_compression = stream.allows_compression;
            Ok(Object::Stream(new_stream))
        }
        _ => Ok(obj.clone()),
    }
}

impl<W: Write> DocumentTransform for PdfTransform<W> {
    fn pages(&self) -> usize {
        self.reader.pages()
    }

    fn in_size(&self) -> Option<Rectangle> {
        self.in_size
    }

    fn slots(&self) -> &[Slot] {
        &self.specs
    }

    fn write_header(&mut self, _maxpage: usize, _modulo: usize) -> Result<()> {
        Ok(())
    }

    fn write_page_comment(&mut self, _label: &str, _outputpage: usize) -> Result<()> {
        Ok(())
    }

    fn write_page(
        &mut self,
        page_list: &PageList,
        _outputpage: usize,
        slot: &Slot,
        maxpage: usize,
        modulo: usize,
        pagebase: usize,
    ) -> Result<()> {
        if let [spec] = slot.as_slice() {
            if !spec.has_transform() && self.draw == 0.0 && Some(self.size) == self.in_size {
                if let Some(real) = self.resolve(spec, page_list, maxpage, modulo, pagebase) {
                    let src_box = media_box(&self.reader.document, self.reader.page_ids[real]);
                    if src_box == Some(self.size) {
                        return self.copy_page(real);
                    }
                }
            }
        }

        let mut content = String::new();
        let mut xobjects = Dictionary::new();
        let mut annots: Vec<Object> = Vec::new();
        for spec in slot {
            let Some(real) = self.resolve(spec, page_list, maxpage, modulo, pagebase) else {
                continue;
            };
            let xobject_id = self.page_xobject(real)?;
            let name = format!("P{real}");
            let m = placement_matrix(spec, self.in_size)?;
            content.push_str(&format!(
                "q\n{} {} {} {} {} {} cm\n/{name} Do\nQ\n",
                m.a, m.b, m.c, m.d, m.e, m.f
            ));
            xobjects.set(name, Object::Reference(xobject_id));
            if self.draw > 0.0 {
                if let Some(annot) = self.border_annotation(m) {
                    annots.push(annot);
                }
            }
        }

        let content_id = self
            .output
            .add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let mut page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_tree_id)),
            ("MediaBox", Object::Array(rect_array(self.size))),
            ("Contents", Object::Reference(content_id)),
            (
                "Resources",
                Object::Dictionary(Dictionary::from_iter(vec![(
                    "XObject",
                    Object::Dictionary(xobjects),
                )])),
            ),
        ]);
        if !annots.is_empty() {
            page.set("Annots", Object::Array(annots));
        }
        let page_id = self.output.add_object(page);
        self.page_refs.push(Object::Reference(page_id));
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let count = self.page_refs.len() as i64;
        let pages_dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(std::mem::take(&mut self.page_refs))),
            ("Count", Object::Integer(count)),
        ]);
        self.output
            .objects
            .insert(self.pages_tree_id, Object::Dictionary(pages_dict));
        let catalog_id = self.output.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_tree_id)),
        ]));
        self.output.trailer.set("Root", catalog_id);

        // Serialize to a buffer first; the sink may not be seekable.
        let mut buf = Vec::new();
        self.output.save_to(&mut buf)?;
        self.outfile.write_all(&buf)?;
        self.outfile.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::transform_pages;

    fn sample_doc(pages: usize, width: f32, height: f32) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for i in 0..pages {
            let content = format!("BT /F1 12 Tf ({i}) Tj ET");
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
            let page_id = doc.add_object(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        0.into(),
                        0.into(),
                        Object::Real(width),
                        Object::Real(height),
                    ]),
                ),
                ("Contents", Object::Reference(content_id)),
            ]));
            kids.push(Object::Reference(page_id));
        }
        let count = kids.len() as i64;
        let pages_dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn run(
        source: Document,
        specs: Vec<Slot>,
        size: Option<Rectangle>,
        modulo: usize,
    ) -> Document {
        let reader = PdfReader::new(source).unwrap();
        let mut doc = PdfTransform::new(
            reader,
            Vec::new(),
            size,
            None,
            specs,
            GlobalTransform::default(),
            0.0,
        )
        .unwrap();
        transform_pages(&mut doc, None, false, false, false, false, modulo).unwrap();
        Document::load_mem(&doc.into_output()).unwrap()
    }

    #[test]
    fn identity_spec_copies_pages_through() {
        let out = run(
            sample_doc(2, 595.0, 842.0),
            vec![vec![PageSpec::default()]],
            None,
            1,
        );
        assert_eq!(out.get_pages().len(), 2);
    }

    #[test]
    fn two_up_places_two_xobjects_per_page() {
        let slot = vec![
            PageSpec {
                scale: 0.5,
                ..Default::default()
            },
            PageSpec {
                pageno: 1,
                scale: 0.5,
                off: Offset::new(297.5, 0.0),
                ..Default::default()
            },
        ];
        let out = run(sample_doc(2, 595.0, 842.0), vec![slot], None, 2);
        let pages = out.get_pages();
        assert_eq!(pages.len(), 1);
        let content = out.get_page_content(pages[&1]).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("/P0 Do"));
        assert!(text.contains("/P1 Do"));
    }

    #[test]
    fn blank_slot_produces_an_empty_page_of_target_size() {
        // 1 real page with modulo 2: the second position is padding.
        let slot0 = vec![PageSpec::default()];
        let slot1 = vec![PageSpec {
            pageno: 1,
            rotate: 90,
            ..Default::default()
        }];
        let out = run(sample_doc(1, 595.0, 842.0), vec![slot0, slot1], None, 2);
        let pages = out.get_pages();
        assert_eq!(pages.len(), 2);
        let blank = out.get_page_content(pages[&2]).unwrap();
        assert!(blank.is_empty() || !String::from_utf8_lossy(&blank).contains("Do"));
    }

    #[test]
    fn size_change_goes_through_the_composite_path() {
        let out = run(
            sample_doc(1, 595.0, 842.0),
            vec![vec![PageSpec::default()]],
            Some(Rectangle::new(612.0, 792.0)),
            1,
        );
        let pages = out.get_pages();
        let page = out.get_dictionary(pages[&1]).unwrap();
        let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(object_f64(&mb[2]), Some(612.0));
        assert_eq!(object_f64(&mb[3]), Some(792.0));
        let content = out.get_page_content(pages[&1]).unwrap();
        assert!(String::from_utf8_lossy(&content).contains("/P0 Do"));
    }

    #[test]
    fn malformed_media_box_falls_back_to_the_target_size() {
        let mut doc = sample_doc(1, 595.0, 842.0);
        let page_id = doc.get_pages()[&1];
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("MediaBox", Object::Array(Vec::new()));
        let out = run(
            doc,
            vec![vec![PageSpec::default()]],
            Some(Rectangle::new(595.0, 842.0)),
            1,
        );
        let pages = out.get_pages();
        assert_eq!(pages.len(), 1);
        let content = out.get_page_content(pages[&1]).unwrap();
        assert!(String::from_utf8_lossy(&content).contains("/P0 Do"));
    }

    #[test]
    fn right_angle_rotation_is_exact() {
        let m = Matrix::rotate(90);
        assert_eq!(m.apply(1.0, 0.0), (0.0, 1.0));
        let m = Matrix::rotate(270);
        assert_eq!(m.apply(1.0, 0.0), (0.0, -1.0));
    }

    #[test]
    fn placement_applies_flip_before_translate() {
        let spec = PageSpec {
            hflip: true,
            off: Offset::new(10.0, 0.0),
            ..Default::default()
        };
        let m = placement_matrix(&spec, Some(Rectangle::new(100.0, 200.0))).unwrap();
        // (0,0) mirrors to x=100, then shifts right by 10.
        assert_eq!(m.apply(0.0, 0.0), (110.0, 0.0));
        assert_eq!(m.apply(100.0, 0.0), (10.0, 0.0));
    }
}
