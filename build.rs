use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // For each hid.bin file in our tests/data directory, create one basic test function
    // that parses that report descriptor and checks the items fit their reports
    let datadir: PathBuf = [concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data")]
        .iter()
        .collect();
    println!("cargo:rerun-if-changed={}", datadir.display());
    let out_dir = std::env::var_os("OUT_DIR").unwrap();
    let dest_path = PathBuf::from(&out_dir).join("test-report-descriptors.rs");
    let mut file = std::fs::File::create(dest_path)?;

    writeln!(file, "use hidups::*;")?;
    writeln!(file)?;

    let mut entries: Vec<_> = std::fs::read_dir(datadir)?
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".hid.bin"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for rdesc in entries {
        let filename = rdesc.file_name().into_string().unwrap();
        let funcname = filename.replace([':', '.', '-'], "_");
        let path = rdesc.path();
        writeln!(
            file,
            "
#[test]
#[allow(non_snake_case)]
fn test_{funcname}() {{
    let bytes: Vec<u8> = std::fs::read({path:?}).unwrap();
    if !bytes.is_empty() {{
        let rdesc = ReportDescriptor::try_from(bytes.as_slice())
            .unwrap_or_else(|e| panic!(\"Failed to parse {filename}: {{e}}\"));
        for item in rdesc.items() {{
            let len = rdesc.report_len(item.report_id).unwrap();
            assert!(item.buffer_offset() + item.size as usize <= len * 8, \"{{}}\", item.path);
        }}
    }}
}}
"
        )?;
    }

    Ok(())
}
