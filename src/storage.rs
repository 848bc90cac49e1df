use anyhow::{Context, Result};
use faceswap_vision::FaceRegion;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Region count on the first line, then that many face-region records.
pub fn read_regions<R: BufRead>(reader: &mut R) -> Result<Vec<FaceRegion>> {
    let mut line = String::new();
    while line.trim().is_empty() {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(vec![]);
        }
    }
    let count: usize = line
        .trim()
        .parse()
        .with_context(|| format!("invalid region count {:?}", line.trim()))?;

    let mut regions = Vec::new();
    for i in 0..count {
        let mut region = FaceRegion::default();
        region
            .read_from(reader)
            .with_context(|| format!("reading region {} of {}", i + 1, count))?;
        regions.push(region);
    }
    Ok(regions)
}

pub fn write_regions<W: Write>(writer: &mut W, regions: &[FaceRegion]) -> Result<()> {
    writeln!(writer, "{}", regions.len())?;
    for region in regions {
        region.write_to(writer)?;
    }
    Ok(())
}

/// Loads a region list. A missing file is an empty list.
pub fn load_regions(path: &Path) -> Result<Vec<FaceRegion>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_regions(&mut BufReader::new(file)).with_context(|| format!("reading {}", path.display()))
}

pub fn save_regions(path: &Path, regions: &[FaceRegion]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    write_regions(&mut writer, regions)?;
    writer.flush()?;
    Ok(())
}

/// Parses `x,y,w,h` into a face region with confidence 1.
pub fn parse_box(spec: &str) -> Result<FaceRegion> {
    let values = spec
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid box {:?}", spec))?;
    let &[x, y, w, h] = values.as_slice() else {
        anyhow::bail!("box {:?} needs four values x,y,w,h", spec);
    };
    if w < 0.0 || h < 0.0 {
        anyhow::bail!("box {:?} has a negative size", spec);
    }
    let mut region = FaceRegion::from_box(x, y, w, h);
    region.set_confidence(1.0);
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_box() {
        let r = parse_box("10, 20,30.5,40").unwrap();
        let b = r.bounding_box();
        assert_eq!((b.x, b.y, b.width, b.height), (10.0, 20.0, 30.5, 40.0));
        assert_eq!(r.confidence(), 1.0);
        assert!(parse_box("1,2,3").is_err());
        assert!(parse_box("1,2,a,4").is_err());
        assert!(parse_box("1,2,-3,4").is_err());
    }

    #[test]
    fn test_empty_input_is_empty_list() {
        assert!(read_regions(&mut Cursor::new("")).unwrap().is_empty());
        assert!(read_regions(&mut Cursor::new("0\n")).unwrap().is_empty());
    }

    #[test]
    fn test_huge_count_fails_cleanly() {
        assert!(read_regions(&mut Cursor::new("18446744073709551615\n")).is_err());
    }

    #[test]
    fn test_short_list_fails() {
        let mut buf = Vec::new();
        write_regions(&mut buf, &[FaceRegion::from_box(0.0, 0.0, 1.0, 1.0)]).unwrap();
        let text = String::from_utf8(buf).unwrap().replacen('1', "2", 1);
        assert!(read_regions(&mut Cursor::new(text)).is_err());
    }
}
