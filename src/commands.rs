//! Remote job-control command templates
//!
//! Every string here is the text after `RCMD `; the session adds the verb and
//! the line terminator.

use uuid::Uuid;

use crate::protocol::reply;
use crate::protocol_core::Reply;

/// Release used when none is given on the command line
pub const DEFAULT_RELEASE: &str = "*CURRENT";

/// A save file name in QTEMP, unique per call: `ZS` + 8 hex digits
pub fn container_name() -> String {
    let id = Uuid::new_v4();
    format!("ZS{}", &id.simple().to_string()[..8]).to_ascii_uppercase()
}

/// A transfer file in the remote IFS `/tmp`, unique per call
pub fn transfer_name() -> String {
    format!("/tmp/zs-{}", Uuid::new_v4().simple())
}

fn savf_member(container: &str) -> String {
    format!("/QSYS.LIB/QTEMP.LIB/{}.FILE", container)
}

pub fn create_savf(container: &str) -> String {
    format!("CRTSAVF FILE(QTEMP/{})", container)
}

pub fn delete_file(file: &str) -> String {
    format!("DLTF FILE(QTEMP/{})", file)
}

pub fn save_object(name: &str, kind: &str, library: &str, release: &str, container: &str) -> String {
    format!(
        "SAVOBJ OBJ({}) OBJTYPE({}) LIB({}) TGTRLS({}) DEV(*SAVF) SAVF(QTEMP/{}) DTACPR(*HIGH)",
        name, kind, library, release, container
    )
}

pub fn copy_to_stream(container: &str, remote: &str) -> String {
    format!(
        "CPYTOSTMF FROMMBR('{}') TOSTMF('{}') STMFOPT(*REPLACE)",
        savf_member(container),
        remote
    )
}

pub fn copy_from_stream(remote: &str, container: &str) -> String {
    format!(
        "CPYFRMSTMF FROMSTMF('{}') TOMBR('{}') MBROPT(*REPLACE)",
        remote,
        savf_member(container)
    )
}

pub fn restore_objects(saved_library: &str, container: &str, restore_library: &str) -> String {
    format!(
        "RSTOBJ OBJ(*ALL) SAVLIB({}) DEV(*SAVF) SAVF(QTEMP/{}) MBROPT(*ALL) RSTLIB({})",
        saved_library, container, restore_library
    )
}

pub fn program_references(library: &str, object: &str, outfile: &str) -> String {
    format!(
        "DSPPGMREF PGM({}/{}) OUTPUT(*OUTFILE) OUTFILE(QTEMP/{})",
        library, object, outfile
    )
}

/// Access path description; one row per key field, naming the based-on file
pub fn access_paths(library: &str, object: &str, outfile: &str) -> String {
    format!(
        "DSPFD FILE({}/{}) TYPE(*ACCPTH) OUTPUT(*OUTFILE) OUTFILE(QTEMP/{})",
        library, object, outfile
    )
}

pub fn database_relations(library: &str, object: &str, outfile: &str) -> String {
    format!(
        "DSPDBR FILE({}/{}) OUTPUT(*OUTFILE) OUTFILE(QTEMP/{})",
        library, object, outfile
    )
}

/// Export a QTEMP outfile as fixed-width, LF-delimited records
pub fn export_fixed(outfile: &str, remote: &str) -> String {
    format!(
        "CPYTOIMPF FROMFILE(QTEMP/{}) TOSTMF('{}') MBROPT(*REPLACE) STMFCCSID(1208) RCDDLM(*LF) DTAFMT(*FIXED)",
        outfile, remote
    )
}

/// A restore that reports "1 objects restored" alongside a failure still
/// restored the single object it was given.
pub fn restore_partially_ok(reply: &Reply) -> bool {
    if reply.code != reply::FAILED {
        return false;
    }
    let mut words = reply.message.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(count), Some("objects"), Some(rest)) => {
            rest.trim_end_matches('.') == "restored" && count.parse::<u32>() == Ok(1)
        }
        _ => false,
    }
}
