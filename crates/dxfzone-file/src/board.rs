//! KiCad 板文件
//!
//! 读取版本、网络和铜层，把新元素追加到根节点末尾，
//! 原有内容逐字节保留。写盘时先写临时文件再替换。

use crate::emit::{render_items, BoardItem, EmitSettings, IdStyle};
use crate::error::FileError;
use crate::sexp::{self, SExp};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 开始使用 `uuid` 标识元素的文件格式版本
pub const UUID_FORMAT_VERSION: u32 = 20240108;

/// 板上的网络
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Net {
    pub code: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Board {
    path: PathBuf,
    text: String,
    version: u32,
    nets: Vec<Net>,
    copper_layers: Vec<String>,
    modified: bool,
}

impl Board {
    /// 打开板文件
    pub fn open(path: &Path) -> Result<Self, FileError> {
        let text = std::fs::read_to_string(path)?;
        let board = Self::from_text(path, text)?;
        info!(
            "Opened board {} (version {}, {} nets, {} copper layers)",
            path.display(),
            board.version,
            board.nets.len(),
            board.copper_layers.len()
        );
        Ok(board)
    }

    /// 从文本解析
    pub fn from_text(path: &Path, text: String) -> Result<Self, FileError> {
        let root = sexp::parse(&text)?;
        if root.head() != Some("kicad_pcb") {
            return Err(FileError::InvalidFormat(
                "root element is not kicad_pcb".to_string(),
            ));
        }

        let version = root
            .child("version")
            .and_then(|v| v.arg(0))
            .and_then(|v| v.as_text())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let nets = root
            .children("net")
            .filter_map(|n| {
                let code = n.arg(0)?.as_text()?.parse().ok()?;
                let name = n.arg(1)?.as_text()?.to_string();
                Some(Net { code, name })
            })
            .collect();

        let copper_layers = root
            .child("layers")
            .map(parse_copper_layers)
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            text,
            version,
            nets,
            copper_layers,
            modified: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn nets(&self) -> &[Net] {
        &self.nets
    }

    pub fn copper_layers(&self) -> &[String] {
        &self.copper_layers
    }

    /// 是否有未保存的追加
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn id_style(&self) -> IdStyle {
        if self.version >= UUID_FORMAT_VERSION {
            IdStyle::Uuid
        } else {
            IdStyle::Legacy
        }
    }

    /// 网络选择列表的顺序：排除 0 号网络，GND 在最前，其余按字母序
    pub fn net_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nets
            .iter()
            .filter(|n| n.code != 0 && !n.name.is_empty())
            .map(|n| n.name.clone())
            .collect();
        names.sort();
        names.dedup();
        if let Some(pos) = names.iter().position(|n| n == "GND") {
            let gnd = names.remove(pos);
            names.insert(0, gnd);
        }
        names
    }

    pub fn find_net(&self, name: &str) -> Result<&Net, FileError> {
        self.nets
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| FileError::NetNotFound(name.to_string()))
    }

    /// 在根节点的右括号前插入新元素
    pub fn append(&mut self, items: &[BoardItem], settings: &EmitSettings) -> Result<(), FileError> {
        if items.is_empty() {
            return Ok(());
        }
        let close = self
            .text
            .rfind(')')
            .ok_or_else(|| FileError::InvalidFormat("missing closing parenthesis".to_string()))?;

        let rendered = render_items(items, self.id_style(), settings);
        let mut insertion = String::with_capacity(rendered.len() + 1);
        if !self.text[..close].ends_with('\n') {
            insertion.push('\n');
        }
        insertion.push_str(&rendered);
        self.text.insert_str(close, &insertion);
        self.modified = true;

        debug!("Appended {} items ({} bytes)", items.len(), insertion.len());
        Ok(())
    }

    /// 写回原路径
    pub fn save(&mut self) -> Result<(), FileError> {
        write_atomic(&self.path, &self.text)?;
        self.modified = false;
        info!("Saved board {}", self.path.display());
        Ok(())
    }

    /// 另存为，之后的保存写到新路径
    pub fn save_as(&mut self, path: &Path) -> Result<(), FileError> {
        write_atomic(path, &self.text)?;
        self.path = path.to_path_buf();
        self.modified = false;
        info!("Saved board as {}", path.display());
        Ok(())
    }
}

/// `(layers (0 "F.Cu" signal) ...)` 中名字以 `.Cu` 结尾的层
fn parse_copper_layers(layers: &SExp) -> Vec<String> {
    layers
        .as_list()
        .unwrap_or(&[])
        .iter()
        .skip(1)
        .filter_map(|layer| layer.as_list()?.get(1)?.as_text())
        .filter(|name| name.ends_with(".Cu"))
        .map(str::to_string)
        .collect()
}

/// 先写入同目录的临时文件，完整写入后再替换目标
fn write_atomic(path: &Path, contents: &str) -> Result<(), FileError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::Builder::new()
        .prefix(".dxfzone-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    // 保留原文件的权限
    if let Ok(meta) = std::fs::metadata(path) {
        file.as_file().set_permissions(meta.permissions())?;
    }
    file.write_all(contents.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxfzone_core::math::Point2;

    const BOARD: &str = r#"(kicad_pcb (version 20240108) (generator "pcbnew")
  (layers
    (0 "F.Cu" signal)
    (31 "B.Cu" signal)
    (44 "Edge.Cuts" user)
  )
  (net 0 "")
  (net 1 "VCC")
  (net 2 "GND")
  (net 3 "/SDA")
)
"#;

    fn board() -> Board {
        Board::from_text(Path::new("test.kicad_pcb"), BOARD.to_string()).unwrap()
    }

    #[test]
    fn test_header() {
        let b = board();
        assert_eq!(b.version(), 20240108);
        assert_eq!(b.id_style(), IdStyle::Uuid);
        assert_eq!(b.nets().len(), 4);
        assert_eq!(b.copper_layers(), &["F.Cu".to_string(), "B.Cu".to_string()]);
    }

    #[test]
    fn test_net_order_gnd_first() {
        assert_eq!(board().net_names(), vec!["GND", "/SDA", "VCC"]);
    }

    #[test]
    fn test_find_net() {
        let b = board();
        assert_eq!(b.find_net("VCC").unwrap().code, 1);
        assert!(matches!(b.find_net("VDD"), Err(FileError::NetNotFound(_))));
    }

    #[test]
    fn test_legacy_version() {
        let text = BOARD.replace("20240108", "20221018");
        let b = Board::from_text(Path::new("old.kicad_pcb"), text).unwrap();
        assert_eq!(b.id_style(), IdStyle::Legacy);
    }

    #[test]
    fn test_rejects_other_root() {
        let result = Board::from_text(Path::new("x"), "(kicad_sch (version 1))".to_string());
        assert!(matches!(result, Err(FileError::InvalidFormat(_))));
        let result = Board::from_text(Path::new("x"), "(kicad_pcb (version 1)".to_string());
        assert!(matches!(result, Err(FileError::Board(_))));
    }

    #[test]
    fn test_append_keeps_prefix() {
        let mut b = board();
        let net = b.find_net("GND").unwrap().clone();
        let outline = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
        let zone = BoardItem::copper_zone(net, "F.Cu", outline, 0.5, 0.25);
        b.append(&[zone], &EmitSettings::default()).unwrap();

        let close = BOARD.rfind(')').unwrap();
        assert!(b.text().starts_with(&BOARD[..close]));
        assert!(b.text().trim_end().ends_with(')'));
        assert!(b.is_modified());
        // 追加后仍是合法的板文件
        let reparsed = Board::from_text(Path::new("x"), b.text().to_string()).unwrap();
        assert_eq!(reparsed.nets().len(), 4);
    }
}
