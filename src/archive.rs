//! CAR archive manager
//!
//! Every command streams through the existing archive one header at a time.
//! Commands that change the archive (add, replace, delete) copy what they keep
//! into a temporary file next to the archive, which is renamed over the original
//! once the pass is complete.  If anything goes wrong the temporary file is
//! deleted when the manager is dropped, and the original is never touched.
//!
//! Members are added with a two-phase header write: a placeholder header
//! reserves the space, the payload follows, and the header is rewritten once
//! the sizes and CRC are known.  The payload is LZSS unless that fails to
//! shrink the file, in which case the file is stored as is.

use std::fs::File;
use std::io::{BufReader,BufWriter,Read,Write,Seek,SeekFrom,ErrorKind};
use std::path::{Path,PathBuf};
use tempfile::NamedTempFile;
use crate::header::{Header,Method,END_OF_ARCHIVE};
use crate::tools::wildcard;
use crate::{crc32,lzss,Error,Options,DYNERR,STDRESULT};

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Command {
    Add,
    Extract,
    Replace,
    Delete,
    Print,
    List,
    Test
}

impl Command {
    /// commands that produce a new archive
    pub fn rewrites(&self) -> bool {
        matches!(self,Command::Add | Command::Replace | Command::Delete)
    }
    pub fn describe(&self) -> &'static str {
        match self {
            Command::Add => "Adding/replacing files to archive",
            Command::Extract => "Extracting files",
            Command::Replace => "Replacing files",
            Command::Delete => "Deleting files from archive",
            Command::Print => "Print files to stdout",
            Command::List => "Listing archive contents",
            Command::Test => "Testing integrity of files"
        }
    }
}

/// Where an expanded member goes
enum Destination<'a> {
    /// a file of the same name in the working directory
    Disk,
    /// nowhere, only the CRC is checked
    Discard,
    Stream(&'a mut dyn Write)
}

/// Percentage saved by compression, 0 for an empty member
pub fn ratio_in_percent(compressed: u32,original: u32) -> i64 {
    if original == 0 {
        return 0;
    }
    100 - (100 * compressed as i64) / original as i64
}

pub struct CarManager {
    opt: Options,
    command: Command,
    car_path: PathBuf,
    work_dir: PathBuf,
    input: Option<BufReader<File>>,
    output: Option<BufWriter<NamedTempFile>>,
    file_list: Vec<String>
}

impl CarManager {
    /// Open the archive for `command`, creating the temporary output if the command needs one.
    /// If `car_path` cannot be opened and has no extension, the default extension is tried.
    /// Only `Add` may start without an existing archive.
    pub fn open(car_path: &Path,command: Command,work_dir: &Path,opt: &Options) -> Result<Self,DYNERR> {
        let mut car_path = car_path.to_path_buf();
        let mut input = File::open(&car_path).ok();
        if input.is_none() && car_path.extension().is_none() {
            car_path.set_extension(opt.extension);
            input = File::open(&car_path).ok();
        }
        if input.is_none() && command != Command::Add {
            return Err(Box::new(Error::ArchiveNotFound(car_path.display().to_string())));
        }
        let output = match command.rewrites() {
            true => {
                // same directory as the archive, so the final rename does not cross filesystems
                let dir = match car_path.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                    _ => PathBuf::from(".")
                };
                let stem = match car_path.file_stem() {
                    Some(s) => s.to_string_lossy().to_string(),
                    None => "car".to_string()
                };
                let temp = tempfile::Builder::new()
                    .prefix(&[stem.as_str(),"."].concat())
                    .suffix(".$$")
                    .tempfile_in(&dir)?;
                log::debug!("temporary archive is {}",temp.path().display());
                Some(BufWriter::new(temp))
            },
            false => None
        };
        Ok(Self {
            opt: opt.clone(),
            command,
            car_path,
            work_dir: work_dir.to_path_buf(),
            input: input.map(BufReader::new),
            output,
            file_list: Vec::new()
        })
    }
    /// path of the archive, after extension defaulting
    pub fn car_path(&self) -> &Path {
        &self.car_path
    }
    /// Take the names the command applies to.  No names means every member,
    /// except for add and delete, which must be given names.
    pub fn build_file_list(&mut self,names: &[String]) -> STDRESULT {
        if names.is_empty() {
            if matches!(self.command,Command::Add | Command::Delete) {
                return Err(Box::new(Error::MissingFileList));
            }
            self.file_list = vec!["*".to_string()];
            return Ok(());
        }
        if names.len() > self.opt.max_files {
            return Err(Box::new(Error::TooManyFiles));
        }
        self.file_list = names.to_vec();
        Ok(())
    }
    fn search_file_list(&self,name: &[u8]) -> bool {
        self.file_list.iter().any(|pattern| wildcard::matches(name,pattern.as_bytes()))
    }
    fn extract_path(&self,header: &Header) -> PathBuf {
        let name = header.display_name();
        match Path::new(name.as_ref()).file_name() {
            Some(base) => self.work_dir.join(base),
            None => self.work_dir.join(name.as_ref())
        }
    }
    fn streams(&mut self) -> Result<(&mut BufReader<File>,&mut BufWriter<NamedTempFile>),DYNERR> {
        match (self.input.as_mut(),self.output.as_mut()) {
            (Some(input),Some(output)) => Ok((input,output)),
            _ => Err(Box::new(Error::NotWritable))
        }
    }
    /// Insert every file in the list into the new archive.  Names in the list are reduced to
    /// their base names, which is what the old archive is later matched against.
    /// A base name already added in this run is skipped with a warning.
    /// Returns the number of files added.
    pub fn add_file_list(&mut self,report: &mut dyn Write) -> Result<usize,DYNERR> {
        let mut count = 0;
        for i in 0..self.file_list.len() {
            let path = self.work_dir.join(&self.file_list[i]);
            let mut source = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    log::error!("could not open {} to add to CAR file",path.display());
                    return Err(Box::new(e));
                }
            };
            let base = match path.file_name() {
                Some(s) => s.to_string_lossy().to_string(),
                None => self.file_list[i].clone()
            };
            let duplicate = self.file_list[0..i].iter().any(|prior| prior.eq_ignore_ascii_case(&base));
            self.file_list[i] = base.clone();
            if duplicate {
                log::warn!("duplicate file name: {}, skipping this file",path.display());
                continue;
            }
            if base.len() >= self.opt.max_name {
                log::warn!("file name {} is too long for a CAR header, skipping this file",base);
                continue;
            }
            let mut header = Header::create(base.as_bytes(),Method::Lzss);
            self.insert(&mut source,&mut header,"Adding",report)?;
            count += 1;
        }
        Ok(count)
    }
    /// Append `source` to the new archive under `header`, compressed if that helps.
    fn insert(&mut self,source: &mut File,header: &mut Header,verb: &str,report: &mut dyn Write) -> STDRESULT {
        write!(report,"{} {:<20}",verb,header.display_name())?;
        let out = match self.output.as_mut() {
            Some(out) => out,
            None => return Err(Box::new(Error::NotWritable))
        };
        let expanded_length = source.metadata()?.len();
        if expanded_length > u32::MAX as u64 {
            return Err(Box::new(Error::FileTooLarge));
        }
        // placeholder header
        let header_pos = out.stream_position()?;
        header.method = Method::Lzss as u8;
        header.original_size = expanded_length as u32;
        header.write(out)?;
        let data_pos = out.stream_position()?;
        source.seek(SeekFrom::Start(0))?;
        let opt = lzss::Options { size_limit: Some(expanded_length) };
        let (in_size,out_size,crc) = match lzss::compress(source,out,&opt)? {
            Some(summary) => (summary.in_size,summary.out_size,summary.crc),
            None => {
                log::debug!("{} does not compress, storing",header.display_name());
                header.method = Method::Stored as u8;
                out.seek(SeekFrom::Start(data_pos))?;
                source.seek(SeekFrom::Start(0))?;
                let (n,crc) = crc32::copy_to_end_with_crc(source,out)?;
                (n,n,crc)
            }
        };
        if in_size > u32::MAX as u64 {
            return Err(Box::new(Error::FileTooLarge));
        }
        header.original_size = in_size as u32;
        header.compressed_size = out_size as u32;
        header.original_crc = crc;
        // final header
        out.seek(SeekFrom::Start(header_pos))?;
        header.write(out)?;
        out.seek(SeekFrom::End(0))?;
        writeln!(report," {}%",ratio_in_percent(header.compressed_size,header.original_size))?;
        Ok(())
    }
    fn skip_over(&mut self,header: &Header) -> STDRESULT {
        if let Some(input) = self.input.as_mut() {
            input.seek_relative(header.compressed_size as i64)?;
        }
        Ok(())
    }
    /// Copy the member whose header was just read into the new archive, byte for byte.
    fn copy_through(&mut self,header: &mut Header) -> STDRESULT {
        let (input,out) = self.streams()?;
        header.write(out)?;
        let expected = header.compressed_size as u64;
        let copied = std::io::copy(&mut input.by_ref().take(expected),out)?;
        if copied < expected {
            log::error!("archive ends inside {}",header.display_name());
            return Err(Box::new(std::io::Error::from(ErrorKind::UnexpectedEof)));
        }
        Ok(())
    }
    /// Expand the member whose header was just read.  A bad CRC, an unknown method, or a
    /// target that cannot be created is reported and the member is passed over; partial
    /// output files are removed.  Read or write failures are errors.
    fn extract(&mut self,header: &Header,dest: Destination,report: &mut dyn Write) -> STDRESULT {
        write!(report,"{:<20} ",header.display_name())?;
        let mut sink = std::io::sink();
        let mut file: Option<(PathBuf,BufWriter<File>)> = None;
        let writer: &mut dyn Write = match dest {
            Destination::Stream(s) => s,
            Destination::Discard => &mut sink,
            Destination::Disk => {
                let path = self.extract_path(header);
                match File::create(&path) {
                    Ok(f) => &mut file.insert((path,BufWriter::new(f))).1,
                    Err(e) => {
                        log::warn!("can't open {}: {}",path.display(),e);
                        writeln!(report,"Can't open {}",path.display())?;
                        writeln!(report,"Not extracted")?;
                        return self.skip_over(header);
                    }
                }
            }
        };
        let input = match self.input.as_mut() {
            Some(input) => input,
            None => return Err(Box::new(Error::ArchiveNotFound(self.car_path.display().to_string())))
        };
        let mut payload = input.by_ref().take(header.compressed_size as u64);
        let expanded_size = header.original_size as u64;
        let outcome: Result<Option<u32>,DYNERR> = match header.method() {
            Some(Method::Stored) => crc32::copy_with_crc(&mut payload,writer,expanded_size).map(Some),
            Some(Method::Lzss) => lzss::expand(&mut payload,writer,expanded_size).map(|s| Some(s.crc)),
            None => Ok(None)
        };
        // leave the input at the next header whatever happened
        let outcome = outcome.and_then(|crc| {
            std::io::copy(&mut payload,&mut std::io::sink())?;
            Ok(crc)
        });
        let good = match outcome {
            Ok(Some(crc)) if crc == header.original_crc => {
                writeln!(report," OK")?;
                true
            },
            Ok(Some(_)) => {
                log::warn!("CRC mismatch in {}",header.display_name());
                writeln!(report,"CRC error reading data")?;
                false
            },
            Err(e) if payload_ran_out(&e,payload.limit()) => {
                log::warn!("payload of {} ended before it expanded fully",header.display_name());
                writeln!(report,"CRC error reading data")?;
                false
            },
            Ok(None) => {
                log::warn!("{} has unknown method {}",header.display_name(),header.method);
                writeln!(report,"Unknown method: {}",header.method)?;
                false
            },
            Err(e) => {
                if let Some((path,partial)) = file {
                    drop(partial);
                    let _ = std::fs::remove_file(&path);
                }
                return Err(e);
            }
        };
        if let Some((path,mut finished)) = file {
            finished.flush()?;
            drop(finished);
            if !good {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
    /// Walk the old archive, doing what the command calls for with each member.
    /// `count` carries over the files already added.  Content for the print
    /// command goes to `printed`, everything else that is shown goes to `report`.
    /// Returns the running count of members acted on.
    pub fn process_input_car(&mut self,mut count: usize,report: &mut dyn Write,printed: &mut dyn Write) -> Result<usize,DYNERR> {
        if self.command == Command::List {
            print_list_titles(report)?;
        }
        loop {
            let maybe_header = match self.input.as_mut() {
                Some(input) => Header::read(input,self.opt.max_name)?,
                None => None
            };
            let mut header = match maybe_header {
                Some(h) => h,
                None => break
            };
            let matched = self.search_file_list(&header.name);
            log::trace!("{} matched {}",header.display_name(),matched);
            match (self.command,matched) {
                (Command::Delete,true) => {
                    self.skip_over(&header)?;
                    count += 1;
                },
                (Command::Add,true) => self.skip_over(&header)?,
                (Command::Delete,false) | (Command::Add,false) | (Command::Replace,false) => {
                    self.copy_through(&mut header)?;
                },
                (Command::List,_) => {
                    if matched {
                        list_entry(report,&header)?;
                        count += 1;
                    }
                    self.skip_over(&header)?;
                },
                (Command::Print,true) => {
                    self.extract(&header,Destination::Stream(&mut *printed),report)?;
                    count += 1;
                },
                (Command::Extract,true) => {
                    self.extract(&header,Destination::Disk,report)?;
                    count += 1;
                },
                (Command::Test,true) => {
                    self.extract(&header,Destination::Discard,report)?;
                    count += 1;
                },
                (Command::Print,false) | (Command::Extract,false) | (Command::Test,false) => {
                    self.skip_over(&header)?;
                },
                (Command::Replace,true) => {
                    let path = self.work_dir.join(header.display_name().as_ref());
                    match File::open(&path) {
                        Ok(mut source) => {
                            self.skip_over(&header)?;
                            let mut fresh = Header::create(&header.name,Method::Lzss);
                            self.insert(&mut source,&mut fresh,"Replacing",report)?;
                            count += 1;
                        },
                        Err(_) => {
                            log::warn!("could not find {} for replacement, skipping",path.display());
                            writeln!(report,"Could not find {} for replacement, skipping",header.display_name())?;
                            self.copy_through(&mut header)?;
                        }
                    }
                }
            }
        }
        Ok(count)
    }
    /// Finish the new archive and put it in place of the old one.  Nothing is committed
    /// unless `count` members were added, replaced, or deleted.
    /// Returns whether the archive was rewritten.
    pub fn commit(self,count: usize) -> Result<bool,DYNERR> {
        let Self { input, output, car_path, .. } = self;
        drop(input);
        let mut writer = match output {
            Some(w) => w,
            None => return Ok(false)
        };
        if count == 0 {
            log::debug!("nothing changed, discarding temporary archive");
            return Ok(false);
        }
        writer.write_all(&[END_OF_ARCHIVE])?;
        let temp = writer.into_inner().map_err(|e| e.into_error())?;
        log::debug!("renaming {} to {}",temp.path().display(),car_path.display());
        match temp.persist(&car_path) {
            Ok(_) => Ok(true),
            Err(e) => {
                log::debug!("rename failed ({}), removing old archive and trying again",e.error);
                if car_path.exists() {
                    std::fs::remove_file(&car_path)?;
                }
                match e.file.persist(&car_path) {
                    Ok(_) => Ok(true),
                    Err(e) => {
                        log::error!("{}",e.error);
                        Err(Box::new(Error::RenameFailed(car_path.display().to_string())))
                    }
                }
            }
        }
    }
}

/// True if `e` came from reading past the end of a member's payload while the archive
/// itself still had data, i.e. the payload is corrupt rather than the archive truncated.
fn payload_ran_out(e: &DYNERR,remaining: u64) -> bool {
    remaining == 0 && matches!(e.downcast_ref::<std::io::Error>(),Some(io) if io.kind()==ErrorKind::UnexpectedEof)
}

fn print_list_titles(report: &mut dyn Write) -> STDRESULT {
    writeln!(report)?;
    writeln!(report,"                       Original  Compressed")?;
    writeln!(report,"     Filename            Size       Size     Ratio   CRC-32   Method")?;
    writeln!(report,"------------------     --------  ----------  -----  --------  ------")?;
    Ok(())
}

fn list_entry(report: &mut dyn Write,header: &Header) -> STDRESULT {
    let method = match header.method() {
        Some(m) => m.name(),
        None => "Unknown"
    };
    writeln!(report,"{:<20} {:>10}  {:>10}  {:>4}%  {:08x}  {}",
        header.display_name(),
        header.original_size,
        header.compressed_size,
        ratio_in_percent(header.compressed_size,header.original_size),
        header.original_crc,
        method)?;
    Ok(())
}

/// Run one command against the archive at `car_path`.
/// `names` are member names or wildcard patterns, or for `Add`, paths of files to add.
/// Files are extracted to, and replacements read from, `work_dir`.
/// Returns the number of members acted on.
pub fn run(car_path: &Path,
    command: Command,
    names: &[String],
    work_dir: &Path,
    opt: &Options,
    report: &mut dyn Write,
    printed: &mut dyn Write) -> Result<usize,DYNERR> {
    let mut car = CarManager::open(car_path,command,work_dir,opt)?;
    car.build_file_list(names)?;
    let mut count = 0;
    if command == Command::Add {
        count = car.add_file_list(report)?;
    }
    count = car.process_input_car(count,report,printed)?;
    car.commit(count)?;
    report.flush()?;
    Ok(count)
}

#[test]
fn ratios() {
    assert_eq!(ratio_in_percent(0,0),0);
    assert_eq!(ratio_in_percent(50,100),50);
    assert_eq!(ratio_in_percent(11,11),0);
    assert_eq!(ratio_in_percent(514,4096),88);
}

#[test]
fn list_format() {
    let mut header = Header::create("b.bin".as_bytes(),Method::Lzss);
    header.original_size = 4096;
    header.compressed_size = 514;
    header.original_crc = 0xc71c0011;
    let mut out = Vec::new();
    list_entry(&mut out,&header).unwrap();
    let expected = ["b.bin",&" ".repeat(22),"4096",&" ".repeat(9),"514",&" ".repeat(4),"88%  c71c0011  LZSS\n"].concat();
    assert_eq!(String::from_utf8(out).unwrap(),expected);
}

#[test]
fn file_list_rules() {
    let dir = tempfile::tempdir().unwrap();
    let car = dir.path().join("x.car");
    let mut mgr = CarManager::open(&car,Command::Add,dir.path(),&crate::STD_OPTIONS).unwrap();
    assert!(mgr.build_file_list(&[]).is_err());
    let too_many: Vec<String> = (0..100).map(|i| i.to_string()).collect();
    assert!(mgr.build_file_list(&too_many).is_err());
    assert!(mgr.build_file_list(&too_many[0..99]).is_ok());
    // nothing was added, so nothing is written
    assert!(!mgr.commit(0).unwrap());
    assert!(!car.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(),0);
}

#[test]
fn extension_defaulting() {
    let dir = tempfile::tempdir().unwrap();
    let bare = dir.path().join("stuff");
    std::fs::write(dir.path().join("stuff.car"),[0u8]).unwrap();
    let mgr = CarManager::open(&bare,Command::List,dir.path(),&crate::STD_OPTIONS).unwrap();
    assert_eq!(mgr.car_path(),dir.path().join("stuff.car"));
    assert!(CarManager::open(&dir.path().join("missing"),Command::List,dir.path(),&crate::STD_OPTIONS).is_err());
}
