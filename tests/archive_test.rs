use carman::archive::{self,Command};
use carman::header::{Header,Method};
use carman::crc32;
use std::path::Path;
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Run a command, returning the count and what was reported
fn run(car: &Path,command: Command,names: &[&str],dir: &Path) -> Result<(usize,String),Box<dyn std::error::Error>> {
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    let mut report: Vec<u8> = Vec::new();
    let mut printed: Vec<u8> = Vec::new();
    let count = archive::run(car,command,&names,dir,&carman::STD_OPTIONS,&mut report,&mut printed)?;
    Ok((count,String::from_utf8(report)?))
}

/// Every header in the archive, in order
fn headers(car: &Path) -> Vec<Header> {
    let bytes = std::fs::read(car).expect("could not read archive");
    let mut ans = Vec::new();
    let mut rest = bytes.as_slice();
    while let Some(h) = Header::read(&mut rest,128).expect("bad header") {
        rest = &rest[h.compressed_size as usize..];
        ans.push(h);
    }
    assert!(rest.is_empty(),"data after end marker");
    ans
}

fn setup(dir: &Path) -> STDRESULT {
    std::fs::write(dir.join("a.txt"),"hello world")?;
    std::fs::write(dir.join("b.bin"),vec![0u8;4096])?;
    Ok(())
}

#[test]
fn add_list_extract_delete() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    let out_dir = dir.join("out");
    std::fs::create_dir(&out_dir)?;
    setup(dir)?;
    let car = dir.join("test.car");

    let (count,report) = run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    assert_eq!(count,2);
    assert!(report.contains("Adding a.txt"));
    assert!(report.contains("Adding b.bin"));

    let members = headers(&car);
    assert_eq!(members.len(),2);
    assert_eq!(members[0].name,b"a.txt".to_vec());
    assert_eq!(members[0].method(),Some(Method::Stored));
    assert_eq!(members[0].compressed_size,11);
    assert_eq!(members[0].original_crc,crc32::checksum(b"hello world"));
    assert_eq!(members[1].name,b"b.bin".to_vec());
    assert_eq!(members[1].method(),Some(Method::Lzss));
    assert_eq!(members[1].original_size,4096);
    assert!(members[1].compressed_size < 600);

    let (count,report) = run(&car,Command::List,&[],dir)?;
    assert_eq!(count,2);
    assert!(report.contains(&format!("{:08x}  Stored",crc32::checksum(b"hello world"))));
    assert!(report.contains(&format!("{:08x}  LZSS",crc32::checksum(&vec![0u8;4096]))));

    let (count,report) = run(&car,Command::Extract,&[],&out_dir)?;
    assert_eq!(count,2);
    assert_eq!(report.matches(" OK").count(),2);
    assert_eq!(std::fs::read(out_dir.join("a.txt"))?,b"hello world".to_vec());
    assert_eq!(std::fs::read(out_dir.join("b.bin"))?,vec![0u8;4096]);

    let (count,_) = run(&car,Command::Delete,&["a.txt"],dir)?;
    assert_eq!(count,1);
    let members = headers(&car);
    assert_eq!(members.len(),1);
    assert_eq!(members[0].name,b"b.bin".to_vec());
    Ok(())
}

#[test]
fn read_only_commands_change_nothing() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    setup(dir)?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    let before = std::fs::read(&car)?;
    let (_,first) = run(&car,Command::List,&[],dir)?;
    let (_,second) = run(&car,Command::List,&[],dir)?;
    assert_eq!(first,second);
    let (count,_) = run(&car,Command::Test,&["*.bin"],dir)?;
    assert_eq!(count,1);
    assert_eq!(std::fs::read(&car)?,before);
    Ok(())
}

#[test]
fn default_extension() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    setup(dir)?;
    run(&dir.join("stuff"),Command::Add,&["a.txt"],dir)?;
    assert!(dir.join("stuff.car").exists());
    assert!(!dir.join("stuff").exists());
    let (count,_) = run(&dir.join("stuff"),Command::List,&[],dir)?;
    assert_eq!(count,1);
    Ok(())
}

#[test]
fn print_to_stream() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    setup(dir)?;
    std::fs::write(dir.join("c.txt"),"abcabcabcabcabcabc")?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","c.txt"],dir)?;
    let mut report: Vec<u8> = Vec::new();
    let mut printed: Vec<u8> = Vec::new();
    let count = archive::run(&car,Command::Print,&[],dir,&carman::STD_OPTIONS,&mut report,&mut printed)?;
    assert_eq!(count,2);
    assert_eq!(printed,b"hello worldabcabcabcabcabcabc".to_vec());
    assert_eq!(String::from_utf8(report)?.matches(" OK").count(),2);
    Ok(())
}

#[test]
fn replace_members() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    let out_dir = dir.join("out");
    std::fs::create_dir(&out_dir)?;
    setup(dir)?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    std::fs::write(dir.join("a.txt"),"goodbye goodbye goodbye goodbye")?;
    let (count,report) = run(&car,Command::Replace,&["a.txt"],dir)?;
    assert_eq!(count,1);
    assert!(report.contains("Replacing a.txt"));
    let members = headers(&car);
    assert_eq!(members.len(),2);
    // replaced where it stood
    assert_eq!(members[0].name,b"a.txt".to_vec());
    assert_eq!(members[1].name,b"b.bin".to_vec());
    run(&car,Command::Extract,&["a.txt"],&out_dir)?;
    assert_eq!(std::fs::read(out_dir.join("a.txt"))?,b"goodbye goodbye goodbye goodbye".to_vec());

    // no replacement on hand, the member is kept as it was
    std::fs::remove_file(dir.join("b.bin"))?;
    let before = std::fs::read(&car)?;
    let (count,report) = run(&car,Command::Replace,&["b.bin"],dir)?;
    assert_eq!(count,0);
    assert!(report.contains("Could not find b.bin"));
    assert_eq!(std::fs::read(&car)?,before);
    Ok(())
}

#[test]
fn adding_again_supersedes() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    let out_dir = dir.join("out");
    std::fs::create_dir(&out_dir)?;
    setup(dir)?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    std::fs::write(dir.join("a.txt"),"second version")?;
    let (count,_) = run(&car,Command::Add,&["a.txt"],dir)?;
    assert_eq!(count,1);
    let members = headers(&car);
    assert_eq!(members.len(),2);
    assert_eq!(members[0].name,b"a.txt".to_vec());
    run(&car,Command::Extract,&["a.txt"],&out_dir)?;
    assert_eq!(std::fs::read(out_dir.join("a.txt"))?,b"second version".to_vec());
    Ok(())
}

#[test]
fn duplicate_names_in_one_add() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    setup(dir)?;
    std::fs::create_dir(dir.join("sub"))?;
    std::fs::write(dir.join("sub").join("A.TXT"),"other")?;
    let car = dir.join("test.car");
    let (count,_) = run(&car,Command::Add,&["a.txt","sub/A.TXT"],dir)?;
    assert_eq!(count,1);
    let members = headers(&car);
    assert_eq!(members.len(),1);
    assert_eq!(members[0].original_crc,crc32::checksum(b"hello world"));
    Ok(())
}

#[test]
fn empty_member() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    let out_dir = dir.join("out");
    std::fs::create_dir(&out_dir)?;
    std::fs::write(dir.join("empty"),b"")?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["empty"],dir)?;
    let members = headers(&car);
    assert_eq!(members[0].original_size,0);
    assert_eq!(members[0].compressed_size,0);
    let (count,report) = run(&car,Command::Extract,&[],&out_dir)?;
    assert_eq!(count,1);
    assert!(report.contains(" OK"));
    assert_eq!(std::fs::read(out_dir.join("empty"))?.len(),0);
    Ok(())
}

#[test]
fn delete_nothing_or_everything() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    setup(dir)?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    let before = std::fs::read(&car)?;
    let (count,_) = run(&car,Command::Delete,&["zzz"],dir)?;
    assert_eq!(count,0);
    assert_eq!(std::fs::read(&car)?,before);
    // a.txt, b.bin, test.car, and no leftover temporary file
    assert_eq!(std::fs::read_dir(dir)?.count(),3);
    let (count,_) = run(&car,Command::Delete,&["*"],dir)?;
    assert_eq!(count,2);
    assert_eq!(std::fs::read(&car)?,vec![0]);
    Ok(())
}

#[test]
fn usage_errors() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    setup(dir)?;
    let car = dir.join("test.car");
    assert!(run(&car,Command::Extract,&[],dir).is_err());
    assert!(run(&car,Command::Add,&[],dir).is_err());
    assert!(run(&car,Command::Add,&["no_such_file"],dir).is_err());
    assert!(!car.exists());
    run(&car,Command::Add,&["a.txt"],dir)?;
    assert!(run(&car,Command::Delete,&[],dir).is_err());
    Ok(())
}

#[test]
fn payload_corruption() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    let out_dir = dir.join("out");
    std::fs::create_dir(&out_dir)?;
    setup(dir)?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    let mut bytes = std::fs::read(&car)?;
    // first payload byte of a.txt, which is stored
    bytes[6 + 17] ^= 0x01;
    std::fs::write(&car,bytes)?;

    let (count,report) = run(&car,Command::Test,&[],dir)?;
    assert_eq!(count,2);
    assert!(report.contains("CRC error reading data"));
    assert_eq!(report.matches(" OK").count(),1);

    let (_,report) = run(&car,Command::Extract,&[],&out_dir)?;
    assert!(report.contains("CRC error reading data"));
    assert!(!out_dir.join("a.txt").exists());
    assert_eq!(std::fs::read(out_dir.join("b.bin"))?,vec![0u8;4096]);
    Ok(())
}

#[test]
fn header_corruption() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    setup(dir)?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    let mut bytes = std::fs::read(&car)?;
    // original size of a.txt
    bytes[7] ^= 0x01;
    std::fs::write(&car,bytes)?;
    match run(&car,Command::List,&[],dir) {
        Err(e) => assert!(e.to_string().contains("header checksum error")),
        Ok(_) => panic!("corrupt header was accepted")
    }
    Ok(())
}

#[test]
fn corrupt_lzss_member_does_not_stop_the_run() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    let out_dir = dir.join("out");
    std::fs::create_dir(&out_dir)?;
    setup(dir)?;
    // 3 literals and one pair behind flags 0x07
    std::fs::write(dir.join("a.txt"),"abcabcabcabcabcabc")?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    let members = headers(&car);
    assert_eq!(members[0].method(),Some(Method::Lzss));
    let mut bytes = std::fs::read(&car)?;
    // all literals, so the decoder wants more bytes than the payload holds
    assert_eq!(bytes[6 + 17],0x07);
    bytes[6 + 17] = 0xff;
    std::fs::write(&car,bytes)?;

    let (count,report) = run(&car,Command::Test,&[],dir)?;
    assert_eq!(count,2);
    assert!(report.contains("CRC error reading data"));
    assert!(report.contains("b.bin                 OK"));

    let (_,report) = run(&car,Command::Extract,&[],&out_dir)?;
    assert!(report.contains("CRC error reading data"));
    assert!(!out_dir.join("a.txt").exists());
    assert_eq!(std::fs::read(out_dir.join("b.bin"))?,vec![0u8;4096]);
    Ok(())
}

#[test]
fn duplicate_names_supersede_old_member() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    let out_dir = dir.join("out");
    std::fs::create_dir(&out_dir)?;
    setup(dir)?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt"],dir)?;
    std::fs::write(dir.join("a.txt"),"new content")?;
    std::fs::create_dir(dir.join("sub"))?;
    std::fs::write(dir.join("sub").join("A.TXT"),"other")?;
    let (count,_) = run(&car,Command::Add,&["a.txt","sub/A.TXT"],dir)?;
    assert_eq!(count,1);
    let members = headers(&car);
    assert_eq!(members.len(),1);
    assert_eq!(members[0].name,b"a.txt".to_vec());
    assert_eq!(members[0].original_crc,crc32::checksum(b"new content"));
    run(&car,Command::Extract,&[],&out_dir)?;
    assert_eq!(std::fs::read(out_dir.join("a.txt"))?,b"new content".to_vec());
    assert!(!out_dir.join("A.TXT").exists());
    Ok(())
}

#[test]
fn unknown_method_is_skipped() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path();
    let out_dir = dir.join("out");
    std::fs::create_dir(&out_dir)?;
    setup(dir)?;
    let car = dir.join("test.car");
    run(&car,Command::Add,&["a.txt","b.bin"],dir)?;
    let mut bytes = std::fs::read(&car)?;
    let mut header = Header::read(&mut bytes.as_slice(),128)?.expect("no first member");
    header.method = 9;
    let mut resealed = Vec::new();
    header.write(&mut resealed)?;
    bytes[0..resealed.len()].copy_from_slice(&resealed);
    std::fs::write(&car,bytes)?;

    let (count,report) = run(&car,Command::Extract,&[],&out_dir)?;
    assert_eq!(count,2);
    assert!(report.contains("Unknown method: 9"));
    assert!(!out_dir.join("a.txt").exists());
    assert!(report.contains("b.bin                 OK"));
    assert_eq!(std::fs::read(out_dir.join("b.bin"))?,vec![0u8;4096]);

    let (_,report) = run(&car,Command::List,&[],dir)?;
    assert!(report.contains("Unknown"));
    assert!(report.contains("LZSS"));
    Ok(())
}
