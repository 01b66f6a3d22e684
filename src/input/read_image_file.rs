// 该文件是 Touxiang （头像） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::ImageItem;
use crate::{FromUrl, url_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch: {0}")]
  SchemaMismatch(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Could not load image from path {path}: {source}")]
  InvalidImage {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("Image {path} has zero area")]
  EmptyImage { path: PathBuf },
  #[error("No image files found in {0}")]
  NoImages(PathBuf),
}

const READ_IMAGE_FILE_SCHEME: &str = "image";
const READ_FOLDER_SCHEME: &str = "folder";
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

fn is_image_file(path: &Path) -> bool {
  path.is_file()
    && path
      .extension()
      .map(|ext| {
        let ext = ext.to_string_lossy().to_lowercase();
        IMAGE_EXTENSIONS.contains(&ext.as_str())
      })
      .unwrap_or(false)
}

/// 按需解码的图像文件序列，单个文件或目录下的全部图像
pub struct ImageFileInput {
  paths: VecDeque<PathBuf>,
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let path = PathBuf::from(url_path(url));
    match url.scheme() {
      READ_IMAGE_FILE_SCHEME => Ok(Self::from_file(path)),
      READ_FOLDER_SCHEME => Self::from_directory(&path),
      other => {
        error!(
          "URI scheme mismatch: expected '{}' or '{}', found '{}'",
          READ_IMAGE_FILE_SCHEME, READ_FOLDER_SCHEME, other
        );
        Err(ImageFileInputError::SchemaMismatch(other.to_string()))
      }
    }
  }
}

impl ImageFileInput {
  pub fn from_file(path: impl Into<PathBuf>) -> Self {
    Self {
      paths: VecDeque::from([path.into()]),
    }
  }

  /// 列出目录下扩展名为 jpg/jpeg/png（不区分大小写）的文件，按路径排序
  pub fn from_directory(directory: &Path) -> Result<Self, ImageFileInputError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if is_image_file(&path) {
        paths.push(path);
      }
    }

    if paths.is_empty() {
      error!("No image files found in the input folder: {}", directory.display());
      return Err(ImageFileInputError::NoImages(directory.to_path_buf()));
    }

    paths.sort();
    info!("Found {} image files in {}", paths.len(), directory.display());
    Ok(Self {
      paths: paths.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.paths.len()
  }
}

/// 读取并解码为 RGB 图像
pub fn read_image(path: &Path) -> Result<ImageItem, ImageFileInputError> {
  debug!("Reading image: {}", path.display());
  let image = ImageReader::open(path)?
    .with_guessed_format()?
    .decode()
    .map_err(|source| {
      error!("Error: Could not load image from path: {}", path.display());
      ImageFileInputError::InvalidImage {
        path: path.to_path_buf(),
        source,
      }
    })?
    .to_rgb8();

  if image.width() == 0 || image.height() == 0 {
    return Err(ImageFileInputError::EmptyImage {
      path: path.to_path_buf(),
    });
  }

  Ok(ImageItem {
    path: path.to_path_buf(),
    image,
  })
}

impl Iterator for ImageFileInput {
  type Item = Result<ImageItem, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.paths.pop_front().map(|path| read_image(&path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn reads_a_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("face.png");
    RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let item = input.next().unwrap().unwrap();
    assert_eq!(item.image.dimensions(), (4, 3));
    assert_eq!(item.file_name(), "face.png");
    assert!(input.next().is_none());
  }

  #[test]
  fn lists_only_images_in_a_folder() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(2, 2).save(dir.path().join("b.png")).unwrap();
    RgbImage::new(2, 2).save(dir.path().join("a.JPG")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

    let input = ImageFileInput::from_directory(dir.path()).unwrap();
    assert_eq!(input.remaining(), 2);
    let names: Vec<String> = input.map(|item| item.unwrap().file_name()).collect();
    assert_eq!(names, vec!["a.JPG", "b.png"]);
  }

  #[test]
  fn empty_folder_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageFileInput::from_directory(dir.path()),
      Err(ImageFileInputError::NoImages(_))
    ));
  }

  #[test]
  fn undecodable_file_is_invalid_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"not an image").unwrap();
    assert!(matches!(
      read_image(&path),
      Err(ImageFileInputError::InvalidImage { .. })
    ));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("http://example.com/face.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch(_))
    ));
  }
}
