//! Per-page text extraction with `lopdf`.

use lopdf::Document;
use std::path::Path;

/// Text of one PDF page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub page: u32,
    /// Raw extracted text; may be blank for image-only pages.
    pub text: String,
}

/// Reasons a file could not be read as a PDF.
#[derive(Debug, thiserror::Error)]
pub enum PdfReadError {
    /// Bytes are not a parseable PDF document.
    #[error("not a parseable PDF: {0}")]
    Parse(String),
    /// Document requires a password.
    #[error("document is encrypted")]
    Encrypted,
    /// Document parsed but has no pages.
    #[error("document has no pages")]
    NoPages,
}

/// Load the PDF at `path` and extract the text of every page in order.
///
/// Encrypted documents are opened with the empty user password, which covers files that only
/// carry an owner password (permission restrictions). Anything needing a real password is
/// rejected. Pages whose content stream cannot be decoded are kept with empty text so page
/// numbering stays aligned with the document.
pub fn extract_pages(path: &Path) -> Result<Vec<PageText>, PdfReadError> {
    let mut document =
        Document::load(path).map_err(|err| PdfReadError::Parse(err.to_string()))?;
    if document.is_encrypted() {
        document.decrypt("").map_err(|err| {
            tracing::debug!(error = %err, "Empty user password rejected");
            PdfReadError::Encrypted
        })?;
        tracing::debug!("Opened owner-password-only PDF");
    }

    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(PdfReadError::NoPages);
    }

    Ok(pages
        .keys()
        .map(|&page| {
            let text = document.extract_text(&[page]).unwrap_or_else(|err| {
                tracing::debug!(page, error = %err, "Page text could not be decoded");
                String::new()
            });
            PageText { page, text }
        })
        .collect())
}

/// Build a small single-font PDF whose pages contain the given lines, for tests.
#[cfg(test)]
pub(crate) fn fixture_pdf(pages: &[&str]) -> Vec<u8> {
    let mut bytes = Vec::new();
    fixture_document(pages)
        .save_to(&mut bytes)
        .expect("serialize fixture pdf");
    bytes
}

#[cfg(test)]
fn fixture_document(pages: &[&str]) -> Document {
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::encryption::{decrypt_object, get_encryption_key};
    use lopdf::{Object, StringFormat, dictionary};
    use std::io::Write;

    /// Standard security handler password padding.
    const PASSWORD_PAD: [u8; 32] = [
        0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
        0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
        0x69, 0x7A,
    ];

    fn rc4(key: &[u8], input: &[u8]) -> Vec<u8> {
        let mut state: Vec<u8> = (0..=255).collect();
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }
        let (mut i, mut j) = (0u8, 0u8);
        input
            .iter()
            .map(|byte| {
                i = i.wrapping_add(1);
                j = j.wrapping_add(state[i as usize]);
                state.swap(i as usize, j as usize);
                byte ^ state[state[i as usize].wrapping_add(state[j as usize]) as usize]
            })
            .collect()
    }

    /// RC4 40-bit (V1/R2) encryption of every stream. With `readable_without_password` the
    /// user password is empty, as in PDFs that only restrict permissions.
    fn encrypted_fixture(pages: &[&str], readable_without_password: bool) -> Vec<u8> {
        let mut doc = fixture_document(pages);
        let file_id = Object::String(b"pdfqa-fixture-id".to_vec(), StringFormat::Hexadecimal);
        doc.trailer.set("ID", vec![file_id.clone(), file_id]);
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "Length" => 40,
            "O" => Object::String(vec![0x4F; 32], StringFormat::Hexadecimal),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt_id);

        let key = get_encryption_key(&doc, "", false).expect("file key");
        let user_entry = if readable_without_password {
            rc4(&key, &PASSWORD_PAD)
        } else {
            vec![0x55; 32]
        };
        doc.get_object_mut(encrypt_id)
            .and_then(Object::as_dict_mut)
            .expect("encrypt dictionary")
            .set("U", Object::String(user_entry, StringFormat::Hexadecimal));

        let ids: Vec<_> = doc.objects.keys().copied().collect();
        for id in ids.into_iter().filter(|id| *id != encrypt_id) {
            let object = doc.objects.get_mut(&id).expect("object");
            if let Object::Stream(stream) = object {
                let cipher = decrypt_object(&key, id, &Object::Stream(stream.clone()))
                    .expect("rc4 stream");
                stream.set_content(cipher);
            }
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("serialize encrypted pdf");
        bytes
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write");
        file
    }

    #[test]
    fn extracts_text_per_page_in_order() {
        let file = write_temp(&fixture_pdf(&["First page", "Second page"]));
        let pages = extract_pages(file.path()).expect("pages");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page, 1);
        assert!(pages[0].text.contains("First page"));
        assert_eq!(pages[1].page, 2);
        assert!(pages[1].text.contains("Second page"));
    }

    #[test]
    fn plain_text_is_not_a_pdf() {
        let file = write_temp(b"just some notes saved with a .pdf extension");
        let error = extract_pages(file.path()).unwrap_err();
        assert!(matches!(error, PdfReadError::Parse(_)));
    }

    #[test]
    fn owner_password_only_pdf_is_readable() {
        let file = write_temp(&encrypted_fixture(&["Restricted but readable text"], true));
        let pages = extract_pages(file.path()).expect("pages");
        assert_eq!(pages.len(), 1);
        assert!(pages[0].text.contains("Restricted but readable text"));
    }

    #[test]
    fn user_password_protected_pdf_is_rejected() {
        let file = write_temp(&encrypted_fixture(&["Secret text"], false));
        let error = extract_pages(file.path()).unwrap_err();
        assert!(matches!(error, PdfReadError::Encrypted));
    }
}
