//! Binary layout of tile data and index files
//!
//! All integers and doubles are little-endian.
//!
//! ```text
//! data record:
//!   [flags: u8]                  low 2 bits: 00 node, 01 way, 10 area, 11 relation
//!   [tag_count: u16]
//!   [key: u32][value: u32] * tag_count
//!   node:     [lat: f64][lon: f64]
//!   way/area: [point_count: u16] then [lat: f64][lon: f64] * point_count
//!   relation: [child_count: u16] then ([child_id: u64][data record]) * child_count
//!
//! index record:
//!   [element_id: u64][data_offset: u32]  = 12 bytes
//! ```

use crate::{Area, Coordinate, Element, Node, Relation, Result, StoreError, Tag, Tags, Way};
use std::io::{self, Read};

pub const INDEX_RECORD_SIZE: usize = 12;

const KIND_MASK: u8 = 0b11;
const NODE_FLAG: u8 = 0b00;
const WAY_FLAG: u8 = 0b01;
const AREA_FLAG: u8 = 0b10;
const RELATION_FLAG: u8 = 0b11;

/// Deepest relation nesting accepted on either side of the codec
pub const MAX_NESTING_DEPTH: usize = 64;

/// Serialize one element (without its id) as a data record
pub fn encode_element(element: &Element) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(64);
    write_record(&mut buffer, element, 0)?;
    Ok(buffer)
}

fn write_record(buffer: &mut Vec<u8>, element: &Element, depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(StoreError::Encoding(format!(
            "element {} nests relations deeper than {MAX_NESTING_DEPTH}",
            element.id()
        )));
    }
    let flags = match element {
        Element::Node(_) => NODE_FLAG,
        Element::Way(_) => WAY_FLAG,
        Element::Area(_) => AREA_FLAG,
        Element::Relation(_) => RELATION_FLAG,
    };
    buffer.push(flags);

    let tags = element.tags();
    buffer.extend_from_slice(&count_u16(tags.len(), "tags", element.id())?.to_le_bytes());
    for tag in tags {
        buffer.extend_from_slice(&tag.key.to_le_bytes());
        buffer.extend_from_slice(&tag.value.to_le_bytes());
    }

    match element {
        Element::Node(node) => write_coordinate(buffer, &node.coordinate),
        Element::Way(Way { id, coordinates, .. }) | Element::Area(Area { id, coordinates, .. }) => {
            buffer.extend_from_slice(&count_u16(coordinates.len(), "points", *id)?.to_le_bytes());
            for coordinate in coordinates {
                write_coordinate(buffer, coordinate);
            }
        }
        Element::Relation(relation) => {
            let count = count_u16(relation.elements.len(), "children", relation.id)?;
            buffer.extend_from_slice(&count.to_le_bytes());
            for child in &relation.elements {
                buffer.extend_from_slice(&child.id().to_le_bytes());
                write_record(buffer, child, depth + 1)?;
            }
        }
    }
    Ok(())
}

#[inline]
fn write_coordinate(buffer: &mut Vec<u8>, coordinate: &Coordinate) {
    buffer.extend_from_slice(&coordinate.latitude.to_le_bytes());
    buffer.extend_from_slice(&coordinate.longitude.to_le_bytes());
}

fn count_u16(count: usize, what: &str, id: u64) -> Result<u16> {
    u16::try_from(count)
        .map_err(|_| StoreError::Encoding(format!("element {id} has {count} {what}, limit is 65535")))
}

/// Serialize an index record
pub fn encode_index(id: u64, offset: u64) -> Result<[u8; INDEX_RECORD_SIZE]> {
    let offset = u32::try_from(offset).map_err(|_| {
        StoreError::Encoding(format!("data offset {offset} of element {id} exceeds 4 GiB"))
    })?;
    let mut record = [0u8; INDEX_RECORD_SIZE];
    record[..8].copy_from_slice(&id.to_le_bytes());
    record[8..].copy_from_slice(&offset.to_le_bytes());
    Ok(record)
}

/// Split an index file into `(id, offset)` pairs
pub fn decode_index(bytes: &[u8]) -> Result<Vec<(u64, u64)>> {
    if bytes.len() % INDEX_RECORD_SIZE != 0 {
        return Err(StoreError::CorruptData(format!(
            "index length {} is not a multiple of {INDEX_RECORD_SIZE}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(INDEX_RECORD_SIZE)
        .map(|record| {
            let mut id = [0u8; 8];
            let mut offset = [0u8; 4];
            id.copy_from_slice(&record[..8]);
            offset.copy_from_slice(&record[8..]);
            (u64::from_le_bytes(id), u64::from(u32::from_le_bytes(offset)))
        })
        .collect())
}

/// Read one data record; the id comes from the index (or the parent relation)
pub fn decode_element<R: Read>(reader: &mut R, id: u64) -> Result<Element> {
    read_record(reader, id, 0).map_err(|err| match err {
        StoreError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
            StoreError::CorruptData(format!("record of element {id} is truncated"))
        }
        other => other,
    })
}

fn read_record<R: Read>(reader: &mut R, id: u64, depth: usize) -> Result<Element> {
    if depth > MAX_NESTING_DEPTH {
        return Err(StoreError::CorruptData(format!(
            "relation nesting of element {id} exceeds {MAX_NESTING_DEPTH}"
        )));
    }
    let flags = read_u8(reader)?;
    if flags & !KIND_MASK != 0 {
        return Err(StoreError::CorruptData(format!(
            "unknown flags {flags:#04x} for element {id}"
        )));
    }
    let tag_count = read_u16(reader)?;
    let mut tags = Tags::with_capacity(usize::from(tag_count));
    for _ in 0..tag_count {
        tags.push(Tag::new(read_u32(reader)?, read_u32(reader)?));
    }

    let element = match flags {
        NODE_FLAG => Element::Node(Node {
            id,
            tags,
            coordinate: read_coordinate(reader)?,
        }),
        WAY_FLAG => Element::Way(Way {
            id,
            tags,
            coordinates: read_coordinates(reader)?,
        }),
        AREA_FLAG => Element::Area(Area {
            id,
            tags,
            coordinates: read_coordinates(reader)?,
        }),
        _ => {
            let child_count = read_u16(reader)?;
            let mut elements = Vec::with_capacity(usize::from(child_count));
            for _ in 0..child_count {
                let child_id = read_u64(reader)?;
                elements.push(read_record(reader, child_id, depth + 1)?);
            }
            Element::Relation(Relation { id, tags, elements })
        }
    };

    Ok(element)
}

fn read_coordinates<R: Read>(reader: &mut R) -> Result<Vec<Coordinate>> {
    let count = read_u16(reader)?;
    (0..count).map(|_| read_coordinate(reader)).collect()
}

#[inline]
fn read_coordinate<R: Read>(reader: &mut R) -> Result<Coordinate> {
    let latitude = read_f64(reader)?;
    let longitude = read_f64(reader)?;
    Ok(Coordinate::new(latitude, longitude))
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        #[inline]
        fn $name<R: Read>(reader: &mut R) -> Result<$ty> {
            let mut bytes = [0u8; size_of::<$ty>()];
            reader.read_exact(&mut bytes)?;
            Ok(<$ty>::from_le_bytes(bytes))
        }
    };
}

read_le!(read_u8, u8);
read_le!(read_u16, u16);
read_le!(read_u32, u32);
read_le!(read_u64, u64);
read_le!(read_f64, f64);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_relation() -> Element {
        Element::from(Relation::new(
            100,
            [Tag::new(7, 8)],
            vec![
                Element::from(Node::new(1, [Tag::new(1, 2)], Coordinate::new(52.5, 13.4))),
                Element::from(Way::new(
                    2,
                    Tags::new(),
                    vec![Coordinate::new(0.1, 0.2), Coordinate::new(-0.3, 1e-9)],
                )),
                Element::from(Relation::new(
                    3,
                    [Tag::new(3, 4), Tag::new(5, 6)],
                    vec![Element::from(Area::new(
                        4,
                        Tags::new(),
                        vec![
                            Coordinate::new(1.0, 1.0),
                            Coordinate::new(1.0, 2.0),
                            Coordinate::new(2.0, 2.0),
                        ],
                    ))],
                )),
            ],
        ))
    }

    #[test]
    fn test_nested_relation_round_trip() {
        let relation = sample_relation();
        let bytes = encode_element(&relation).unwrap();
        let decoded = decode_element(&mut bytes.as_slice(), 100).unwrap();
        assert_eq!(decoded, relation);
    }

    #[test]
    fn test_node_layout() {
        let node = Element::from(Node::new(9, [Tag::new(1, 2)], Coordinate::new(1.5, -2.5)));
        let bytes = encode_element(&node).unwrap();

        assert_eq!(bytes.len(), 1 + 2 + 8 + 16);
        assert_eq!(bytes[0], NODE_FLAG);
        assert_eq!(&bytes[1..3], &1u16.to_le_bytes());
        assert_eq!(&bytes[3..7], &1u32.to_le_bytes());
        assert_eq!(&bytes[7..11], &2u32.to_le_bytes());
        assert_eq!(&bytes[11..19], &1.5f64.to_le_bytes());
        assert_eq!(&bytes[19..27], &(-2.5f64).to_le_bytes());
    }

    #[test]
    fn test_index_records() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_index(42, 0).unwrap());
        bytes.extend_from_slice(&encode_index(7, 1234).unwrap());
        assert_eq!(bytes.len(), 2 * INDEX_RECORD_SIZE);
        assert_eq!(decode_index(&bytes).unwrap(), vec![(42, 0), (7, 1234)]);

        assert!(matches!(
            encode_index(1, u64::from(u32::MAX) + 1),
            Err(StoreError::Encoding(_))
        ));
        assert!(matches!(
            decode_index(&bytes[..13]),
            Err(StoreError::CorruptData(_))
        ));
    }

    #[test]
    fn test_too_many_points_fails_to_encode() {
        let way = Element::from(Way::new(
            1,
            Tags::new(),
            vec![Coordinate::new(0.0, 0.0); usize::from(u16::MAX) + 1],
        ));
        assert!(matches!(encode_element(&way), Err(StoreError::Encoding(_))));
    }

    #[test]
    fn test_relation_nesting_is_bounded() {
        // A chain of single-child relations, far deeper than any real tile holds
        let mut bytes = Vec::new();
        for child_id in 0..10_000u64 {
            bytes.push(RELATION_FLAG);
            bytes.extend_from_slice(&0u16.to_le_bytes());
            bytes.extend_from_slice(&1u16.to_le_bytes());
            bytes.extend_from_slice(&child_id.to_le_bytes());
        }
        match decode_element(&mut bytes.as_slice(), 1) {
            Err(StoreError::CorruptData(message)) => assert!(message.contains("nesting")),
            other => panic!("expected corrupt data, got {other:?}"),
        }

        let mut element = Element::from(Node::new(1, Tags::new(), Coordinate::new(0.0, 0.0)));
        for id in 0..=MAX_NESTING_DEPTH as u64 {
            element = Element::from(Relation::new(id + 2, Tags::new(), vec![element]));
        }
        assert!(matches!(encode_element(&element), Err(StoreError::Encoding(_))));
    }

    #[test]
    fn test_corrupt_records() {
        let bytes = encode_element(&sample_relation()).unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            decode_element(&mut &truncated[..], 100),
            Err(StoreError::CorruptData(_))
        ));

        let node = Element::from(Node::new(1, Tags::new(), Coordinate::new(0.0, 0.0)));
        let mut bytes = encode_element(&node).unwrap();
        bytes[0] = 0b1000_0000;
        assert!(matches!(
            decode_element(&mut bytes.as_slice(), 1),
            Err(StoreError::CorruptData(_))
        ));
    }
}
